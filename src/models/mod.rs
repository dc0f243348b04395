pub mod article;
pub mod comment;
pub mod engagement;
pub mod response;
pub mod user;
