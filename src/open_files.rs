//! Table des fichiers ouverts

use alloc::vec::Vec;

use crate::{FsError, Result, FILENAME_LEN};

/// Descripteur visible par l'appelant
pub type Fd = usize;

/// Un fichier ouvert : lié à un emplacement du répertoire, avec sa propre position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    pub fd: Fd,
    pub slot: usize,
    /// Nom au moment de l'ouverture, revérifié avant chaque accès
    pub name: [u8; FILENAME_LEN],
    pub offset: usize,
}

pub struct OpenFileTable {
    handles: Vec<Handle>,
    next_fd: Fd,
    capacity: usize,
}

impl OpenFileTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
            next_fd: 0,
            capacity,
        }
    }

    /// Les descripteurs sont attribués dans l'ordre et jamais réutilisés
    pub fn open(&mut self, slot: usize, name: [u8; FILENAME_LEN]) -> Result<Fd> {
        if self.handles.len() >= self.capacity {
            return Err(FsError::TooManyOpen);
        }
        let fd = self.next_fd;
        self.next_fd += 1;
        self.handles.push(Handle {
            fd,
            slot,
            name,
            offset: 0,
        });
        Ok(fd)
    }

    pub fn close(&mut self, fd: Fd) -> Result<Handle> {
        let index = self
            .handles
            .iter()
            .position(|h| h.fd == fd)
            .ok_or(FsError::NotOpen)?;
        Ok(self.handles.remove(index))
    }

    pub fn get(&self, fd: Fd) -> Result<&Handle> {
        self.handles.iter().find(|h| h.fd == fd).ok_or(FsError::NotOpen)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut Handle> {
        self.handles.iter_mut().find(|h| h.fd == fd).ok_or(FsError::NotOpen)
    }

    /// Au moins un descripteur pointe-t-il sur cet emplacement ?
    pub fn is_referenced(&self, slot: usize) -> bool {
        self.handles.iter().any(|h| h.slot == slot)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
