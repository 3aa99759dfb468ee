//! Page Components

mod dashboard;
mod home;
mod pricing;

pub use dashboard::DashboardPage;
pub use home::HomePage;
pub use pricing::PricingPage;
