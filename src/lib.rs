//! Photo Colorization Client
//!
//! This library provides the client side of the colorization service:
//! uploading a black-and-white photo as a remote job, polling the job until
//! it completes, synthesizing a smooth progress percentage meanwhile, and
//! handing exactly one result or error transition to the caller.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
