//! Extension pour lire la configuration du mur depuis pmoconfig
//!
//! Ce module fournit le trait `WallConfigExt` qui ajoute à `pmoconfig::Config`
//! la construction du `WallLayout` validé et des réglages de session.
//!
//! # Exemple
//!
//! ```rust,ignore
//! use pmoconfig::get_config;
//! use pmowall::WallConfigExt;
//!
//! let config = get_config();
//! let layout = config.get_wall_layout()?;
//! let session = config.get_session_config();
//! ```

use pmoconfig::Config;

use crate::errors::{Result, WallError};
use crate::layout::WallLayout;
use crate::model::ColorMode;
use crate::session::SessionConfig;

/// Trait d'extension pour la configuration du client de mur vidéo
pub trait WallConfigExt {
    /// Construit et valide le `WallLayout` à partir de la section `wall`
    ///
    /// Une section absente ou mal formée donne `WallError::InvalidLayout`.
    fn get_wall_layout(&self) -> Result<WallLayout>;

    /// Réglages du client : URL de l'API, intervalles et mode couleur
    fn get_session_config(&self) -> SessionConfig;
}

impl WallConfigExt for Config {
    fn get_wall_layout(&self) -> Result<WallLayout> {
        let section = self
            .get_wall_section()
            .map_err(|err| WallError::invalid_layout(err.to_string()))?;
        WallLayout::from_section(&section)
    }

    fn get_session_config(&self) -> SessionConfig {
        SessionConfig {
            api_base_url: self.get_api_base_url(),
            poll_interval: self.get_poll_interval(),
            volume_lock_margin: self.get_volume_lock_margin(),
            request_timeout: self.get_request_timeout(),
            default_color_mode: ColorMode(self.get_default_color_mode()),
        }
    }
}
