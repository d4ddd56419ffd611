pub mod password;

use chrono::NaiveDate;
use rand::distributions::Alphanumeric;
use rand::Rng;

pub use password::{hash_password, verify_password, Password};

/// Receipt number in the form `RCP-YYYYMMDD-XXXXXXXX`.
pub fn generate_receipt_number(date: NaiveDate) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect();
    format!("RCP-{}-{}", date.format("%Y%m%d"), suffix)
}
