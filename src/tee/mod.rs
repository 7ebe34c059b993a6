// SGX measurement, SIGSTRUCT handling, signing keys and signing flows
pub mod keygen;
pub mod measurement;
pub mod signing;
pub mod sigstruct;

pub use keygen::KeyPair;
pub use measurement::{measure_enclave, signer_identity, MrEnclave, MrSigner};
pub use sigstruct::{Attributes, MaskedValue, SignedSigstruct, Sigstruct, SigningFields, VerifiedIdentity};
