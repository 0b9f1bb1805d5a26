#![allow(dead_code)]

pub mod fakes;
pub mod images;
pub mod prostascan_env;
