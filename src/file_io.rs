// lecture / écriture par fenêtres d'un bloc, via un tampon intermédiaire

use log::{debug, warn};

use crate::filesystem::Volume;
use crate::{BlockDevice, Fd, FsError, Result, BLOCK_SIZE, FAT_EOC};

impl<D: BlockDevice> Volume<D> {
    pub(crate) fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let handle = self.handle(fd)?;
        let entry = *self.root.entry(handle.slot);
        let size = entry.size() as usize;
        if buf.is_empty() || handle.offset >= size {
            return Ok(0);
        }

        // jamais au-delà de la taille enregistrée
        let count = buf.len().min(size - handle.offset);
        let mut done = 0;
        let outcome = self.read_at(entry.head(), handle.offset, &mut buf[..count], &mut done);
        self.files.get_mut(fd)?.offset = handle.offset + done;

        match outcome {
            Ok(()) => Ok(done),
            Err(e) if done == 0 => Err(e),
            Err(e) => {
                warn!("lecture interrompue après {} octets: {}", done, e);
                Ok(done)
            }
        }
    }

    fn read_at(&mut self, head: u16, offset: usize, buf: &mut [u8], done: &mut usize) -> Result<()> {
        let mut scratch = [0u8; BLOCK_SIZE];
        // la chaîne doit couvrir toute la taille du fichier
        let mut block = match self.fat.nth_block(head, offset / BLOCK_SIZE) {
            Err(FsError::OutOfRange) => return Err(FsError::Corrupted),
            other => other?,
        };

        loop {
            let pos = offset + *done;
            let in_block = pos % BLOCK_SIZE;
            let len = (BLOCK_SIZE - in_block).min(buf.len() - *done);

            self.device
                .read_block(self.superblock.data_block(block), &mut scratch)?;
            buf[*done..*done + len].copy_from_slice(&scratch[in_block..in_block + len]);
            *done += len;

            if *done == buf.len() {
                return Ok(());
            }
            block = self.fat.next(block)?.ok_or(FsError::Corrupted)?;
        }
    }

    pub(crate) fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize> {
        let handle = self.handle(fd)?;
        if data.is_empty() {
            return Ok(0);
        }

        let mut done = 0;
        let outcome = self.write_at(handle.slot, handle.offset, data, &mut done);
        self.files.get_mut(fd)?.offset = handle.offset + done;

        match outcome {
            Ok(()) => Ok(done),
            Err(FsError::NoSpace) => {
                debug!("volume plein: {} octets écrits sur {}", done, data.len());
                Ok(done)
            }
            Err(e) if done == 0 => Err(e),
            Err(e) => {
                warn!("écriture interrompue après {} octets: {}", done, e);
                Ok(done)
            }
        }
    }

    // Taille et tête sont mises à jour après chaque fenêtre, `done` reste exact en cas d'erreur.
    fn write_at(&mut self, slot: usize, offset: usize, data: &[u8], done: &mut usize) -> Result<()> {
        let mut scratch = [0u8; BLOCK_SIZE];
        let head = self.root.entry(slot).head();
        let index = offset / BLOCK_SIZE;
        let mut next = match self.fat.nth_block(head, index) {
            Ok(block) => Some(block),
            // position en fin de chaîne : le bloc sera alloué
            Err(FsError::OutOfRange) if self.fat.chain_len(head)? == index => None,
            Err(FsError::OutOfRange) => return Err(FsError::Corrupted),
            Err(e) => return Err(e),
        };

        while *done < data.len() {
            let pos = offset + *done;
            let in_block = pos % BLOCK_SIZE;
            let len = (BLOCK_SIZE - in_block).min(data.len() - *done);

            let (block, fresh) = match next {
                Some(block) => (block, false),
                None => {
                    let head = self.root.entry(slot).head();
                    let block = self.fat.extend_chain(head)?;
                    if head == FAT_EOC {
                        self.root.entry_mut(slot).set_head(block);
                    }
                    (block, true)
                }
            };

            let physical = self.superblock.data_block(block);
            // un bloc neuf ou entièrement réécrit n'a rien à préserver
            if fresh || len == BLOCK_SIZE {
                scratch.fill(0);
            } else {
                self.device.read_block(physical, &mut scratch)?;
            }
            scratch[in_block..in_block + len].copy_from_slice(&data[*done..*done + len]);
            if let Err(e) = self.device.write_block(physical, &scratch) {
                if fresh {
                    self.release_block(slot, block)?;
                }
                return Err(e);
            }
            *done += len;

            let entry = self.root.entry_mut(slot);
            if pos + len > entry.size() as usize {
                entry.set_size((pos + len) as u32);
            }
            next = self.fat.next(block)?;
        }
        Ok(())
    }

    // rendre le bloc alloué pour une fenêtre dont l'écriture a échoué
    fn release_block(&mut self, slot: usize, block: u16) -> Result<()> {
        let head = self.root.entry(slot).head();
        self.fat.release_tail(head)?;
        if head == block {
            self.root.entry_mut(slot).set_head(FAT_EOC);
        }
        warn!("bloc {} rendu après un échec d'écriture", block);
        Ok(())
    }
}
