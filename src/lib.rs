#![allow(async_fn_in_trait)]

pub mod cli;
pub mod utils;
pub mod client;
pub mod entities;
pub mod config;
pub mod storage;
pub mod store;
pub mod error;
