pub mod case;
pub mod opf;
pub mod pf;
