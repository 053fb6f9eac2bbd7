pub mod path;
pub mod snapshot;

pub use snapshot::DeviceSnapshot;
