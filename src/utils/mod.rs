pub mod clock;
pub mod extract;
pub mod middleware;
