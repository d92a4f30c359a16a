pub const APP_NAME: &str = env!("APP_NAME");
pub const APP_VERSION: &str = env!("APP_VERSION");
pub const APP_ID: &str = env!("APP_ID");

pub const CONFIG_FILE_NAME: &str = "launcher.json";
pub const BACKEND_LOG_FILE_NAME: &str = "backend.log";
pub const MAIN_WINDOW_LABEL: &str = "main";
