// src/lib.rs
pub mod block;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod executor;
pub mod stakers;
pub mod state;
pub mod txs;
pub mod types;
pub mod utxo;
