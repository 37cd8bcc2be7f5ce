use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Name of the file persisting per-document scroll offsets.
const SCROLL_STATE_FILE: &str = "scroll_state.json";

pub struct Dirs;

impl Dirs {
    /// Project directory of livemd.
    ///
    /// `None` if no home directory could be determined.
    pub fn project() -> Option<&'static ProjectDirs> {
        static CELL: OnceLock<Option<ProjectDirs>> = OnceLock::new();

        CELL.get_or_init(|| ProjectDirs::from("org", "livemd", "livemd"))
            .as_ref()
    }

    /// Directory of the config file.
    pub fn config_dir() -> Option<PathBuf> {
        Self::project().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Data directory, created if it does not exist yet.
    pub fn data_dir() -> std::io::Result<PathBuf> {
        let project = Self::project().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no home directory found")
        })?;
        let data_dir = project.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Ok(data_dir.to_path_buf())
    }

    /// File persisting the scroll offset of each document.
    pub fn scroll_state_file() -> std::io::Result<PathBuf> {
        Ok(Self::data_dir()?.join(SCROLL_STATE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_state_file_lives_in_data_dir() {
        // Sandboxed environments may have no home directory at all.
        let Some(project) = Dirs::project() else {
            return;
        };
        if let Ok(file) = Dirs::scroll_state_file() {
            assert!(file.starts_with(project.data_dir()));
            assert!(file.ends_with(SCROLL_STATE_FILE));
        }
    }
}
