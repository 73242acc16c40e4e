pub mod archiver;
