mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    AuthSettings, ClientSettings, HubSettings, LoggingSettings, PersistenceSettings,
    ServerSettings, Settings,
};

/// Loads the configuration from the default file and environment variables
/// and merges it over the default values.
///
/// Environment variables use the `ROOMHUB_` prefix and a double underscore
/// between section and key, e.g. `ROOMHUB_SERVER__PORT=9000`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("ROOMHUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = Settings::default().merge(partial);
    settings.validate()?;
    Ok(settings)
}
