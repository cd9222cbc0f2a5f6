mod hash;
mod key;
pub mod token;

pub use hash::{hash_secret, verify_secret};
pub use key::{KeyMaterial, KEY_SIZE};
pub use token::{
    decode as decode_token, encode as encode_token, encode_text as encode_token_text,
    token_timestamp, TokenError,
};
