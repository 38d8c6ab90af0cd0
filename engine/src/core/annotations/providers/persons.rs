//! Ollama Person Identifier
//!
//! Recognizes known people by showing the vision model one reference
//! portrait per person next to the image under test.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::annotations::PersonIdentifier;
use crate::core::assets::classify;
use crate::core::settings::CaptioningSettings;
use crate::core::{CoreError, CoreResult, MediaKind};

use super::ollama::{encode_image, OllamaClient};

/// Answer the model gives when nobody matches
const NO_MATCH: &str = "none";

/// One known person and the portrait used to recognize them
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceFace {
    pub name: String,
    pub image: PathBuf,
}

/// Collects `<faces_dir>/<Name>/<portrait>` entries, taking the first image
/// (by file name) of every person folder.
pub fn load_reference_faces(faces_dir: &Path) -> CoreResult<Vec<ReferenceFace>> {
    if !faces_dir.is_dir() {
        return Err(CoreError::InvalidConfig(format!(
            "Faces directory not found: {}",
            faces_dir.display()
        )));
    }

    let mut faces: Vec<ReferenceFace> = Vec::new();
    let portraits = WalkDir::new(faces_dir)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && classify(e.path()) == MediaKind::Image);

    for entry in portraits {
        let Some(name) = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().trim().to_string())
        else {
            continue;
        };
        if name.is_empty() || faces.iter().any(|f| f.name == name) {
            continue;
        }
        faces.push(ReferenceFace {
            name,
            image: entry.into_path(),
        });
    }

    Ok(faces)
}

/// Prompt listing the reference images in upload order
pub fn identification_prompt(names: &[&str]) -> String {
    let listing: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("image {} shows {}", i + 1, name))
        .collect();
    format!(
        "The first {} images are reference portraits: {}. \
         Which of these people appear in the last image? \
         Answer only with their names separated by commas, or \"{}\" if none of them appear.",
        names.len(),
        listing.join(", "),
        NO_MATCH
    )
}

/// Keeps the known names mentioned in a model answer, in answer order
pub fn parse_identified_names(answer: &str, known: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    answer
        .split([',', ';', '\n'])
        .map(|part| part.trim().trim_matches(|c: char| c == '.' || c == '"' || c == '*').trim())
        .filter(|part| !part.is_empty() && !part.eq_ignore_ascii_case(NO_MATCH))
        .filter_map(|part| {
            known
                .iter()
                .find(|name| name.eq_ignore_ascii_case(part))
                .map(|name| name.to_string())
        })
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

// =============================================================================
// Identifier
// =============================================================================

pub struct OllamaPersonIdentifier {
    client: OllamaClient,
    model: String,
    names: Vec<String>,
    /// Base64 portraits, aligned with `names`
    portraits: Vec<String>,
}

impl OllamaPersonIdentifier {
    pub fn new(settings: &CaptioningSettings, faces_dir: &Path) -> CoreResult<Self> {
        let faces = load_reference_faces(faces_dir)?;
        if faces.is_empty() {
            return Err(CoreError::InvalidConfig(format!(
                "No reference portraits under {}",
                faces_dir.display()
            )));
        }

        let mut names = Vec::with_capacity(faces.len());
        let mut portraits = Vec::with_capacity(faces.len());
        for face in faces {
            portraits.push(BASE64_STANDARD.encode(std::fs::read(&face.image)?));
            names.push(face.name);
        }
        info!("Loaded {} reference face(s)", names.len());

        Ok(Self {
            client: OllamaClient::new(settings)?,
            model: settings.model.clone(),
            names,
            portraits,
        })
    }

    pub fn known_names(&self) -> &[String] {
        &self.names
    }
}

#[async_trait]
impl PersonIdentifier for OllamaPersonIdentifier {
    fn name(&self) -> &str {
        &self.model
    }

    async fn identify(&self, image: &Path) -> CoreResult<Vec<String>> {
        let known: Vec<&str> = self.names.iter().map(String::as_str).collect();

        let mut images = self.portraits.clone();
        images.push(encode_image(image).await?);

        let answer = self
            .client
            .generate(&self.model, &identification_prompt(&known), images)
            .await
            .map_err(CoreError::PersonIdentificationFailed)?;

        let found = parse_identified_names(&answer, &known);
        debug!("Persons in {}: {:?}", image.display(), found);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_faces_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (person, files) in [
            ("Anna", vec!["b.jpg", "a.png"]),
            ("Ben", vec!["notes.txt", "ben.jpeg"]),
            ("Empty", vec!["readme.md"]),
        ] {
            let folder = dir.path().join(person);
            fs::create_dir_all(&folder).unwrap();
            for file in files {
                fs::write(folder.join(file), b"x").unwrap();
            }
        }
        fs::write(dir.path().join("loose.jpg"), b"x").unwrap();
        dir
    }

    #[test]
    fn test_load_reference_faces() {
        let dir = create_faces_dir();

        let faces = load_reference_faces(dir.path()).unwrap();

        let names: Vec<&str> = faces.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Anna", "Ben"]);
        assert!(faces[0].image.ends_with("Anna/a.png"));
        assert!(faces[1].image.ends_with("Ben/ben.jpeg"));
    }

    #[test]
    fn test_load_reference_faces_missing_dir() {
        let result = load_reference_faces(Path::new("/nonexistent/faces"));
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_identification_prompt_lists_people_in_order() {
        let prompt = identification_prompt(&["Anna", "Ben"]);
        assert!(prompt.starts_with("The first 2 images"));
        assert!(prompt.contains("image 1 shows Anna, image 2 shows Ben"));
    }

    #[test]
    fn test_parse_identified_names() {
        let known = ["Anna", "Ben", "Carla"];
        assert_eq!(
            parse_identified_names("ben, Anna.", &known),
            vec!["Ben".to_string(), "Anna".to_string()]
        );
        assert_eq!(
            parse_identified_names("Anna\nAnna; Dave", &known),
            vec!["Anna".to_string()]
        );
        assert!(parse_identified_names("None", &known).is_empty());
        assert!(parse_identified_names("", &known).is_empty());
    }

    #[test]
    fn test_identifier_needs_portraits() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Nobody")).unwrap();

        let result = OllamaPersonIdentifier::new(&CaptioningSettings::default(), dir.path());
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_identifier_loads_known_names() {
        let dir = create_faces_dir();

        let identifier =
            OllamaPersonIdentifier::new(&CaptioningSettings::default(), dir.path()).unwrap();
        assert_eq!(identifier.known_names().to_vec(), vec!["Anna".to_string(), "Ben".to_string()]);
    }
}
