//! Symbol universe port.

use crate::domain::error::StratscanError;
use std::collections::BTreeSet;

pub trait SymbolDirectory: Send + Sync {
    fn active_symbols(&self) -> Result<BTreeSet<String>, StratscanError>;
}

impl<T: SymbolDirectory + ?Sized> SymbolDirectory for std::sync::Arc<T> {
    fn active_symbols(&self) -> Result<BTreeSet<String>, StratscanError> {
        (**self).active_symbols()
    }
}
