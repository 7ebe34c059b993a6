// CLI command implementations
pub mod component_add;
pub mod gen_sign_data;
pub mod init;
pub mod set_signature;
pub mod show;
