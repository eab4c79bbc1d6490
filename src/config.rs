pub mod settings;

pub use settings::{
    generate_default_config, AccountingSettings, LoggingSettings, ServerSettings, Settings,
    StoreSettings,
};
