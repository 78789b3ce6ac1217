pub mod cpu;
pub mod gdb;
pub mod instruction;
pub mod registers;
