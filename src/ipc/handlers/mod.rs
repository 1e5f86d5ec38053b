pub mod backup;
pub mod core;
pub mod marks;
pub mod merit;
pub mod settings;
pub mod students;
pub mod subjects;
