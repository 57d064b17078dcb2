//! Values passed to and returned from a connection.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error::CannotConvertSqlVal, Result};

/// A database value.
///
/// Used both for statement parameters and for the cells of [`Rows`][crate::db::Rows].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SqlVal {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}
impl SqlVal {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlVal::Null)
    }
    pub fn bool(&self) -> Result<bool> {
        match self {
            SqlVal::Bool(val) => Ok(*val),
            // Backends without a native boolean store integers.
            SqlVal::Int(val) => Ok(*val != 0),
            SqlVal::BigInt(val) => Ok(*val != 0),
            _ => Err(CannotConvertSqlVal("bool", self.clone())),
        }
    }
    pub fn integer(&self) -> Result<i32> {
        match self {
            SqlVal::Int(val) => Ok(*val),
            SqlVal::BigInt(val) => {
                i32::try_from(*val).map_err(|_| CannotConvertSqlVal("int", self.clone()))
            }
            _ => Err(CannotConvertSqlVal("int", self.clone())),
        }
    }
    pub fn bigint(&self) -> Result<i64> {
        match self {
            SqlVal::Int(val) => Ok(*val as i64),
            SqlVal::BigInt(val) => Ok(*val),
            _ => Err(CannotConvertSqlVal("big int", self.clone())),
        }
    }
    pub fn real(&self) -> Result<f64> {
        match self {
            SqlVal::Real(val) => Ok(*val),
            _ => Err(CannotConvertSqlVal("float", self.clone())),
        }
    }
    pub fn text(&self) -> Result<&str> {
        match self {
            SqlVal::Text(val) => Ok(val),
            _ => Err(CannotConvertSqlVal("string", self.clone())),
        }
    }
    pub fn owned_text(self) -> Result<String> {
        match self {
            SqlVal::Text(val) => Ok(val),
            _ => Err(CannotConvertSqlVal("string", self)),
        }
    }
    pub fn blob(&self) -> Result<&[u8]> {
        match self {
            SqlVal::Blob(val) => Ok(val),
            _ => Err(CannotConvertSqlVal("blob", self.clone())),
        }
    }
}

impl fmt::Display for SqlVal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use SqlVal::*;
        match &self {
            Null => f.write_str("NULL"),
            Bool(val) => write!(f, "{val}"),
            Int(val) => write!(f, "{val}"),
            BigInt(val) => write!(f, "{val}"),
            Real(val) => write!(f, "{val}"),
            Text(val) => write!(f, "'{val}'"),
            Blob(val) => {
                f.write_str("x'")?;
                for b in val {
                    write!(f, "{b:02x}")?;
                }
                f.write_str("'")
            }
        }
    }
}

macro_rules! impl_from_for_sqlval {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for SqlVal {
            fn from(val: $ty) -> Self {
                SqlVal::$variant(val.into())
            }
        }
    };
}

impl_from_for_sqlval!(bool, Bool);
impl_from_for_sqlval!(i32, Int);
impl_from_for_sqlval!(i64, BigInt);
impl_from_for_sqlval!(f64, Real);
impl_from_for_sqlval!(String, Text);
impl_from_for_sqlval!(&str, Text);
impl_from_for_sqlval!(Vec<u8>, Blob);
impl_from_for_sqlval!(&[u8], Blob);

impl<T> From<Option<T>> for SqlVal
where
    T: Into<SqlVal>,
{
    fn from(val: Option<T>) -> Self {
        match val {
            Some(v) => v.into(),
            None => SqlVal::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn from_option() {
        assert_eq!(SqlVal::from(Some(5i64)), SqlVal::BigInt(5));
        assert_eq!(SqlVal::from(None::<String>), SqlVal::Null);
    }

    #[test]
    fn integer_narrowing() {
        assert_eq!(SqlVal::BigInt(42).integer().unwrap(), 42);
        let err = SqlVal::BigInt(i64::MAX).integer().unwrap_err();
        assert!(matches!(err, Error::CannotConvertSqlVal("int", SqlVal::BigInt(_))));
    }

    #[test]
    fn bool_from_integer() {
        assert!(SqlVal::BigInt(1).bool().unwrap());
        assert!(!SqlVal::Int(0).bool().unwrap());
        assert!(SqlVal::Text("true".into()).bool().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(SqlVal::Text("a".into()).to_string(), "'a'");
        assert_eq!(SqlVal::Blob(vec![0xde, 0xad]).to_string(), "x'dead'");
        assert_eq!(SqlVal::Null.to_string(), "NULL");
    }
}
