pub mod forecast;
pub mod portfolio;
