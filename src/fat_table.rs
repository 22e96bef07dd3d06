//! Gestion de la table FAT

use alloc::vec;
use alloc::vec::Vec;
use log::{trace, warn};

use crate::{BlockDevice, FsError, Result, Superblock, BLOCK_SIZE, FAT_EOC, FAT_FREE};

/// Nombre d'entrées de 16 bits par bloc de FAT
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / 2;

/// Copie en mémoire de la FAT.
///
/// Chaque entrée vaut `FAT_FREE`, `FAT_EOC` (dernier bloc d'une chaîne) ou
/// l'index du bloc suivant. L'entrée 0 est réservée et vaut toujours `FAT_EOC`.
pub struct AllocationTable {
    entries: Vec<u16>,
    data_blocks: usize,
}

impl AllocationTable {
    /// Table vide pour un volume neuf
    pub fn new(data_blocks: usize) -> Self {
        let fat_blocks = data_blocks.div_ceil(ENTRIES_PER_BLOCK).max(1);
        let mut entries = vec![FAT_FREE; fat_blocks * ENTRIES_PER_BLOCK];
        entries[0] = FAT_EOC;
        Self { entries, data_blocks }
    }

    /// Lire tous les blocs de FAT depuis le périphérique
    pub fn load<D: BlockDevice>(device: &mut D, sb: &Superblock) -> Result<Self> {
        let fat_blocks = sb.fat_blocks as usize;
        let mut entries = Vec::with_capacity(fat_blocks * ENTRIES_PER_BLOCK);
        let mut buffer = [0u8; BLOCK_SIZE];

        for i in 0..fat_blocks {
            device.read_block(sb.first_fat_block() + i, &mut buffer)?;
            entries.extend(
                buffer
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]])),
            );
        }

        if entries.first() != Some(&FAT_EOC) {
            warn!("entrée FAT réservée invalide");
            return Err(FsError::InvalidVolume);
        }

        Ok(Self {
            entries,
            data_blocks: sb.data_blocks as usize,
        })
    }

    /// Réécrire tous les blocs de FAT
    pub fn store<D: BlockDevice>(&self, device: &mut D, sb: &Superblock) -> Result<()> {
        let mut buffer = [0u8; BLOCK_SIZE];
        for (i, chunk) in self.entries.chunks(ENTRIES_PER_BLOCK).enumerate() {
            for (slot, entry) in buffer.chunks_exact_mut(2).zip(chunk) {
                slot.copy_from_slice(&entry.to_le_bytes());
            }
            device.write_block(sb.first_fat_block() + i, &buffer)?;
        }
        Ok(())
    }

    /// Nombre de blocs de données couverts par la table
    pub fn data_blocks(&self) -> usize {
        self.data_blocks
    }

    /// Valeur brute de l'entrée, `None` hors du volume
    pub fn entry(&self, block: u16) -> Option<u16> {
        if (block as usize) < self.data_blocks {
            Some(self.entries[block as usize])
        } else {
            None
        }
    }

    /// Un bloc hors du volume n'est jamais libre
    pub fn is_free(&self, block: u16) -> bool {
        self.entry(block) == Some(FAT_FREE)
    }

    pub fn free_count(&self) -> usize {
        self.entries[..self.data_blocks]
            .iter()
            .filter(|&&e| e == FAT_FREE)
            .count()
    }

    // le bloc 0 n'est jamais attribué
    fn in_range(&self, block: u16) -> bool {
        block != 0 && (block as usize) < self.data_blocks
    }

    /// Parcourir une chaîne depuis sa tête
    pub fn chain(&self, head: u16) -> Chain<'_> {
        Chain {
            fat: self,
            current: head,
            steps: 0,
            done: false,
        }
    }

    /// Bloc suivant dans la chaîne, `None` en fin de chaîne
    pub fn next(&self, block: u16) -> Result<Option<u16>> {
        if !self.in_range(block) || self.is_free(block) {
            return Err(FsError::Corrupted);
        }
        match self.entries[block as usize] {
            FAT_EOC => Ok(None),
            next => Ok(Some(next)),
        }
    }

    /// Le `n`-ième bloc (à partir de 0) de la chaîne
    pub fn nth_block(&self, head: u16, n: usize) -> Result<u16> {
        match self.chain(head).nth(n) {
            Some(block) => block,
            None => Err(FsError::OutOfRange),
        }
    }

    pub fn chain_len(&self, head: u16) -> Result<usize> {
        self.chain(head).try_fold(0, |len, block| block.map(|_| len + 1))
    }

    /// Premier bloc libre, marqué comme fin de chaîne
    pub fn allocate_one(&mut self) -> Result<u16> {
        let block = (1..self.data_blocks)
            .find(|&i| self.entries[i] == FAT_FREE)
            .ok_or(FsError::NoSpace)?;
        self.entries[block] = FAT_EOC;
        trace!("bloc de données {} alloué", block);
        Ok(block as u16)
    }

    /// Ajouter un bloc en fin de chaîne.
    ///
    /// Si `head` vaut `FAT_EOC` (fichier vide), le bloc alloué devient la tête
    /// de la nouvelle chaîne ; c'est à l'appelant de l'enregistrer.
    pub fn extend_chain(&mut self, head: u16) -> Result<u16> {
        let tail = match self.chain(head).last() {
            Some(tail) => Some(tail?),
            None => None,
        };
        let block = self.allocate_one()?;
        if let Some(tail) = tail {
            self.entries[tail as usize] = block;
        }
        Ok(block)
    }

    /// Libérer tous les blocs d'une chaîne.
    ///
    /// La chaîne est parcourue une première fois : si elle est corrompue, rien
    /// n'est libéré.
    pub fn free_chain(&mut self, head: u16) -> Result<()> {
        self.chain_len(head)?;
        let mut current = head;
        while current != FAT_EOC {
            let next = self.entries[current as usize];
            self.entries[current as usize] = FAT_FREE;
            trace!("bloc de données {} libéré", current);
            current = next;
        }
        Ok(())
    }

    /// Retirer le dernier bloc d'une chaîne non vide.
    ///
    /// Renvoie le nouveau dernier bloc, `None` si la chaîne est désormais vide.
    pub fn release_tail(&mut self, head: u16) -> Result<Option<u16>> {
        let mut prev = None;
        let mut last = None;
        for block in self.chain(head) {
            prev = last;
            last = Some(block?);
        }
        let last = last.ok_or(FsError::OutOfRange)?;
        self.entries[last as usize] = FAT_FREE;
        if let Some(prev) = prev {
            self.entries[prev as usize] = FAT_EOC;
        }
        trace!("bloc de données {} rendu", last);
        Ok(prev)
    }
}

/// Itérateur sur les blocs d'une chaîne.
///
/// Produit `Err(Corrupted)` puis s'arrête si la chaîne sort de la table,
/// passe par un bloc libre ou boucle.
pub struct Chain<'a> {
    fat: &'a AllocationTable,
    current: u16,
    steps: usize,
    done: bool,
}

impl Iterator for Chain<'_> {
    type Item = Result<u16>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.current == FAT_EOC {
            return None;
        }
        let block = self.current;
        if !self.fat.in_range(block) || self.fat.is_free(block) || self.steps >= self.fat.data_blocks {
            warn!("chaîne corrompue au bloc {}", block);
            self.done = true;
            return Some(Err(FsError::Corrupted));
        }
        self.steps += 1;
        self.current = self.fat.entries[block as usize];
        Some(Ok(block))
    }
}
