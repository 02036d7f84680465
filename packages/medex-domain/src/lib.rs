pub mod export;
pub mod history;
pub mod mail;
pub mod report;
