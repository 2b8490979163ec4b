//! Contracts for the system's external collaborators (spec §6): the batch
//! scheduler, the input-file generators, and the parsers that turn solver
//! output into typed properties. Everything here is either a trait boundary
//! or a subprocess-invoking implementation of one — none of the external
//! binaries themselves are simulated in-process.

pub mod extractor;
pub mod generator;
pub mod hashing;
pub mod scheduler;

pub use extractor::{
    band_path_from_config, classify_outcome, condense_band_path, dos_indicates_metal, expand_band_path,
    extract_dimensionality, extract_input_settings, extract_properties, extract_space_group, is_metallic,
    ExtractedProperty, ExtractedSettings,
};
pub use generator::{InputGenerator, ProcessInputGenerator};
pub use hashing::{hash_bytes, hash_file};
pub use scheduler::{JobStatus, SchedulerClient, SchedulerStatus, SlurmClient};
