pub mod formant;
pub mod note;
pub mod pitch;
pub mod windowing;
