pub mod atoms;
pub mod config;
pub mod convert;
pub mod doctor;
pub mod equilibrate;
pub mod init;
pub mod ligand;
pub mod resp;
pub mod run;
pub mod status;
pub mod topology;
