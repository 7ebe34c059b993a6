// Bundle container, blob digests and component assembly
pub mod assembler;
pub mod container;
pub mod digest;

pub use assembler::{add_component, set_sgx_signature, ComponentSources};
pub use container::{default_path, Bundle, MANIFEST_NAME};
pub use digest::Digest;
