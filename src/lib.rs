// src/lib.rs

//! Mirror Crawler Library
//!
//! Archives the public timeline of an account, with its media, by paging
//! through rotating mirror front-ends.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
