// src/services/mod.rs
pub mod cache;
pub mod cape;
pub mod dcf;
pub mod eastmoney;
pub mod projection;
pub mod ratios;
pub mod risk;
pub mod table;
pub mod valuation;
