mod model;
mod repository;

pub use model::{HouseholdBillDB, HouseholdBillFieldsDB, NewHouseholdBillDB};
pub use repository::HouseholdBillRepository;
