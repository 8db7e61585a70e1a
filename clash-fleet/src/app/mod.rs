pub mod logging;
pub mod provider_manager;
pub mod remote_content_manager;
