//! Data models for the SACCO back-office.
//!
//! Every type serializes to camelCase JSON; lifecycle enums serialize to the
//! upper-case codes that are also stored in the database.

/// Declares a fieldless enum backed by a fixed string code, used both on the
/// wire and in SQLite TEXT columns.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $code:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $code)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            pub fn from_str(s: &str) -> Option<Self> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

use rust_decimal::Decimal;

use crate::engine::money::round_money;
use crate::errors::AppError;

/// Reject amounts that are zero or negative once rounded to cents, so a
/// sub-cent input never lands in the ledger as `0.00`.
pub(crate) fn require_positive_money(amount: Decimal, label: &str) -> Result<(), AppError> {
    if round_money(amount) <= Decimal::ZERO {
        return Err(AppError::Validation(format!(
            "{} must be at least 0.01",
            label
        )));
    }
    Ok(())
}

mod audit;
mod books;
mod dashboard;
mod dividend;
mod guarantor;
mod invitation;
mod ledger;
mod loan;
mod member;
mod report;
mod settings;

pub use audit::*;
pub use books::*;
pub use dashboard::*;
pub use dividend::*;
pub use guarantor::*;
pub use invitation::*;
pub use ledger::*;
pub use loan::*;
pub use member::*;
pub use report::*;
pub use settings::*;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sub_cent_amounts_rejected() {
        assert!(require_positive_money(dec!(0.01), "Amount").is_ok());
        assert!(require_positive_money(dec!(0.005), "Amount").is_ok());
        assert!(matches!(
            require_positive_money(dec!(0.004), "Amount"),
            Err(AppError::Validation(_))
        ));
        assert!(require_positive_money(dec!(0), "Amount").is_err());
        assert!(require_positive_money(dec!(-5), "Amount").is_err());
    }
}
