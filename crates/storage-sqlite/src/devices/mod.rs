mod model;
mod repository;

pub use model::{DeviceDB, DeviceFieldsDB, NewDeviceDB};
pub use repository::DeviceRepository;
