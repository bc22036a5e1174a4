//! Service modules for the SoliDB web front-end.
//!
//! - [`sdb`] - SoliDB REST/SDBQL client and its test double
//! - [`config`] - environment configuration
//! - [`belote`], [`kanban`], [`invoice`], [`calendar`], [`datatype`] - the
//!   business rules the controllers apply before writing to SoliDB
//! - [`slug`] - name normalisation shared by pages, channels and repositories

pub mod belote;
pub mod calendar;
pub mod config;
pub mod datatype;
pub mod invoice;
pub mod kanban;
pub mod sdb;
pub mod slug;
