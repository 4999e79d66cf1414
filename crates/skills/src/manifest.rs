//! Instruction-skill packages: discovery and manifest parsing.
//!
//! A package is a directory with a `SKILL.md` manifest (YAML frontmatter +
//! markdown body) and optional `scripts/` and `references/` subtrees.
//! Invalid packages are logged and skipped; they never fail startup.

use regex_lite::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

const MANIFEST_FILE: &str = "SKILL.md";
const MAX_NAME_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 1024;

/// Frontmatter fields the format defines; anything else invalidates the
/// package.
const VALID_FIELDS: &[&str] = &[
    "name",
    "description",
    "license",
    "compatibility",
    "metadata",
    "allowed-tools",
];

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("static regex"))
}

/// Parsed frontmatter of a manifest.
#[derive(Debug, Clone, Default, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
    license: Option<String>,
    compatibility: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(rename = "allowed-tools")]
    allowed_tools: Option<String>,
}

/// Metadata loaded at startup. Only name + description reach the system
/// prompt; the body loads on demand through the bridge.
#[derive(Debug, Clone)]
pub struct SkillManifest {
    pub name: String,
    pub description: String,
    pub license: Option<String>,
    pub compatibility: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub allowed_tools: Option<String>,
    /// Root of the package directory.
    pub path: PathBuf,
}

/// Full package content, loaded lazily.
#[derive(Debug, Clone)]
pub struct SkillContent {
    /// Manifest body (markdown after the frontmatter fence).
    pub instructions: String,
    /// File names under `scripts/`.
    pub scripts: Vec<String>,
    /// File names under `references/`.
    pub references: Vec<String>,
}

/// Split a manifest into (frontmatter YAML, body). The frontmatter is fenced
/// by `---` lines at the top of the file.
pub fn split_frontmatter(content: &str) -> Option<(String, String)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;
    let end = rest.find("\n---")?;
    let frontmatter = rest[..end].to_string();
    let body = rest[end + 4..]
        .trim_start_matches('-')
        .trim_start()
        .to_string();
    Some((frontmatter, body))
}

/// Validate parsed frontmatter against the directory it came from.
/// Returns all violations, empty when valid.
fn validate(frontmatter_yaml: &serde_yaml::Value, fm: &Frontmatter, dir_name: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(mapping) = frontmatter_yaml.as_mapping() {
        for key in mapping.keys() {
            if let Some(key) = key.as_str() {
                if !VALID_FIELDS.contains(&key) {
                    errors.push(format!("unknown frontmatter field: {key}"));
                }
            }
        }
    }

    match &fm.name {
        None => errors.push("missing required field: name".into()),
        Some(name) => {
            if name.len() > MAX_NAME_LEN || !name_pattern().is_match(name) {
                errors.push(format!("invalid name: {name}"));
            } else if name != dir_name {
                errors.push(format!("name '{name}' doesn't match directory '{dir_name}'"));
            }
        }
    }

    match &fm.description {
        None => errors.push("missing required field: description".into()),
        Some(desc) if desc.is_empty() => errors.push("missing required field: description".into()),
        Some(desc) if desc.len() > MAX_DESCRIPTION_LEN => {
            errors.push(format!("description exceeds {MAX_DESCRIPTION_LEN} characters"))
        }
        Some(_) => {}
    }

    errors
}

/// Load one package's manifest. Returns `None` (with a warning) on any
/// validation failure.
pub fn load_manifest(skill_dir: &Path) -> Option<SkillManifest> {
    let manifest_path = skill_dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&manifest_path).ok()?;

    let (frontmatter_raw, _) = match split_frontmatter(&content) {
        Some(parts) => parts,
        None => {
            warn!(path = %manifest_path.display(), "Manifest has no frontmatter");
            return None;
        }
    };

    let yaml: serde_yaml::Value = match serde_yaml::from_str(&frontmatter_raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %manifest_path.display(), error = %e, "Invalid manifest frontmatter");
            return None;
        }
    };
    let fm: Frontmatter = match serde_yaml::from_value(yaml.clone()) {
        Ok(fm) => fm,
        Err(e) => {
            warn!(path = %manifest_path.display(), error = %e, "Invalid manifest fields");
            return None;
        }
    };

    let dir_name = skill_dir.file_name()?.to_string_lossy().to_string();
    let errors = validate(&yaml, &fm, &dir_name);
    if !errors.is_empty() {
        warn!(skill = %dir_name, errors = ?errors, "Skipping invalid skill package");
        return None;
    }

    Some(SkillManifest {
        name: fm.name.unwrap_or_default(),
        description: fm.description.unwrap_or_default(),
        license: fm.license,
        compatibility: fm.compatibility,
        metadata: fm.metadata,
        allowed_tools: fm.allowed_tools,
        path: skill_dir.to_path_buf(),
    })
}

/// Load the full package content (body plus file listings).
pub fn load_content(manifest: &SkillManifest) -> std::io::Result<SkillContent> {
    let content = std::fs::read_to_string(manifest.path.join(MANIFEST_FILE))?;
    let instructions = split_frontmatter(&content)
        .map(|(_, body)| body)
        .unwrap_or_default();

    Ok(SkillContent {
        instructions,
        scripts: list_files(&manifest.path.join("scripts")),
        references: list_files(&manifest.path.join("references")),
    })
}

fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Scan configured directories for packages. Directories are scanned in
/// order; the first occurrence of a name wins.
pub fn discover_skills(skill_dirs: &[String]) -> Vec<SkillManifest> {
    let mut skills: Vec<SkillManifest> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    for dir in skill_dirs {
        let base = Path::new(dir);
        if !base.exists() {
            debug!(dir = %base.display(), "Skill directory does not exist");
            continue;
        }

        let mut children: Vec<PathBuf> = std::fs::read_dir(base)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir() && p.join(MANIFEST_FILE).exists())
                    .collect()
            })
            .unwrap_or_default();
        children.sort();

        for child in children {
            if let Some(manifest) = load_manifest(&child) {
                if seen.insert(manifest.name.clone()) {
                    skills.push(manifest);
                }
            }
        }
    }

    skills
}
