pub mod loader;
pub mod settings;
pub mod upstream;
pub mod validator;
