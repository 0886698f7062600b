mod expense;
mod money;
mod split;
mod trip;

pub use expense::Expense;
pub use money::{Money, MoneyError};
pub use split::{allocate, validate_custom, SplitError};
pub use trip::Trip;
