pub mod dates;
pub mod elapsed;
