pub mod driver;
pub mod effects;
pub mod error;
pub mod forecast;
pub mod grid;
pub mod io;
pub mod model;
pub mod objectives;
pub mod reducer;
pub mod rng;
pub mod rules;
pub mod turn_order;
