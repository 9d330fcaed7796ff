pub mod pupil;
pub mod stack;
pub mod synthetic;
