use thiserror::Error;

pub type Result<T> = core::result::Result<T, FsError>;

/// Les différentes erreurs possibles
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("Aucun volume monté")]
    NotMounted,
    #[error("Volume invalide (signature ou superbloc incorrect)")]
    InvalidVolume,
    #[error("Erreur d'entrée/sortie")]
    IoError,
    #[error("Le fichier existe déjà")]
    AlreadyExists,
    #[error("Fichier non trouvé")]
    NotFound,
    #[error("Nom de fichier trop long")]
    NameTooLong,
    #[error("Nom de fichier invalide")]
    InvalidName,
    #[error("Répertoire racine plein")]
    DirectoryFull,
    #[error("Ressource occupée (fichier ouvert ou volume déjà monté)")]
    Busy,
    #[error("Trop de fichiers ouverts")]
    TooManyOpen,
    #[error("Descripteur non ouvert")]
    NotOpen,
    #[error("Position hors limites")]
    OutOfRange,
    #[error("Plus d'espace libre")]
    NoSpace,
    #[error("Table d'allocation corrompue")]
    Corrupted,
}
