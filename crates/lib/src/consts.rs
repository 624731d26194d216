pub const APP_NAME: &str = "modforge";

/// Sentinel file kept in every output directory; never removed by sweeps.
pub const STAMP_FILENAME: &str = ".modforge-stamp";

/// Stamp file format version.
pub const STAMP_VERSION: u32 = 1;

/// Extension appended to a destination binary while it is being replaced.
pub const BACKUP_EXTENSION: &str = "bak";

/// Extension of every module output binary.
pub const BINARY_EXTENSION: &str = "lib";

/// Auxiliary debug artifacts that travel with a module binary.
pub const DEFAULT_AUX_EXTENSIONS: &[&str] = &["pdb", "map"];

/// Predefined module receiving sources that no declaration owns.
pub const DEFAULT_MODULE: &str = "Default";

/// Predefined module receiving unowned sources below an `Editor` folder.
pub const DEFAULT_EDITOR_MODULE: &str = "Default-Editor";

/// Folder name that routes unowned sources to [`DEFAULT_EDITOR_MODULE`].
pub const EDITOR_FOLDER: &str = "editor";

/// Names no declaration may use.
pub const RESERVED_MODULE_NAMES: &[&str] = &[DEFAULT_MODULE, DEFAULT_EDITOR_MODULE];

/// Length of the truncated fingerprint used in logs.
pub const FINGERPRINT_PREFIX_LEN: usize = 20;
