pub mod hash_utils;
pub mod str_utils;
