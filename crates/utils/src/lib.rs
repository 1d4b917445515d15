pub mod assets;
pub mod log_lines;
pub mod log_msg;
pub mod msg_store;
pub mod response;
pub mod version;
