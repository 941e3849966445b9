pub mod capture;
pub mod devices;
pub mod hold_exercise;
pub mod listen;
pub mod replay;
pub mod source;
pub mod wav;
