use crate::error::Result;
use modelsync_api::GraphStore;
use std::ops::{Deref, DerefMut};

/// Open store transaction that rolls back unless committed.
pub struct StoreTx<'a, S: GraphStore + ?Sized> {
    store: &'a mut S,
    open: bool,
}

impl<'a, S: GraphStore + ?Sized> StoreTx<'a, S> {
    pub fn begin(store: &'a mut S) -> Result<Self> {
        store.begin_tx()?;
        Ok(Self { store, open: true })
    }

    pub fn commit(mut self) -> Result<()> {
        self.open = false;
        self.store.commit_tx()?;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.open = false;
        self.store.rollback_tx()?;
        Ok(())
    }
}

impl<S: GraphStore + ?Sized> Deref for StoreTx<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.store
    }
}

impl<S: GraphStore + ?Sized> DerefMut for StoreTx<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.store
    }
}

impl<S: GraphStore + ?Sized> Drop for StoreTx<'_, S> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.store.rollback_tx() {
                tracing::error!("Failed to roll back abandoned transaction: {}", e);
            }
        }
    }
}
