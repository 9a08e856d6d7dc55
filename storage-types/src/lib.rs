mod label;
mod naming;
mod size;

pub use label::DiskLabelKind;
pub use naming::safe_device_name;
pub use size::{GIB, KIB, MIB, bytes_to_pretty, pretty_to_bytes};
