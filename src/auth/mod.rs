pub mod linkedin;

pub use linkedin::LinkedInAuth;
