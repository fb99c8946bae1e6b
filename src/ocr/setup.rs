use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Trained data needed by every text mode.
pub const REQUIRED_LANGUAGES: [&str; 2] = ["eng", "chi_sim"];

const COMMON_INSTALL_DIRS: [&str; 2] = [
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];

#[derive(Clone, Debug)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    pub tessdata: PathBuf,
}

/// Returns the directory for storing Tesseract files
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("delta-buyer")
        .join("tesseract")
}

fn executable_name() -> &'static str {
    if cfg!(windows) {
        "tesseract.exe"
    } else {
        "tesseract"
    }
}

/// True if `dir` holds trained data for every language in `languages`.
pub fn tessdata_has(dir: &Path, languages: &[&str]) -> bool {
    languages
        .iter()
        .all(|lang| dir.join(format!("{}.traineddata", lang)).exists())
}

/// Languages from `languages` that `dir` lacks.
pub fn missing_languages<'a>(dir: &Path, languages: &[&'a str]) -> Vec<&'a str> {
    languages
        .iter()
        .copied()
        .filter(|lang| !dir.join(format!("{}.traineddata", lang)).exists())
        .collect()
}

fn traineddata_url(lang: &str) -> String {
    format!("{}/{}.traineddata", TESSDATA_REPO, lang)
}

/// Ensures a Tesseract executable and the required trained data are available.
///
/// Trained data missing from every known location is downloaded into the
/// local data directory.
pub fn ensure_tesseract() -> Result<TesseractPaths> {
    let executable = find_tesseract_executable()?;

    if let Some(tessdata) = find_tessdata_dir(&REQUIRED_LANGUAGES) {
        info!("Tesseract ready: {} ({})", executable.display(), tessdata.display());
        return Ok(TesseractPaths {
            executable,
            tessdata,
        });
    }

    let tessdata = get_tesseract_dir().join("tessdata");
    fs::create_dir_all(&tessdata)
        .with_context(|| format!("Failed to create {}", tessdata.display()))?;

    for lang in missing_languages(&tessdata, &REQUIRED_LANGUAGES) {
        fetch_traineddata(&tessdata, lang)?;
    }

    info!("Tesseract ready: {} ({})", executable.display(), tessdata.display());
    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Copies trained data from a system install, or downloads it.
fn fetch_traineddata(tessdata_dir: &Path, lang: &str) -> Result<()> {
    let file_name = format!("{}.traineddata", lang);
    let target = tessdata_dir.join(&file_name);

    for dir in COMMON_INSTALL_DIRS {
        let system = PathBuf::from(dir).join("tessdata").join(&file_name);
        if system.exists() {
            info!("Copying {} from: {}", file_name, system.display());
            fs::copy(&system, &target)?;
            return Ok(());
        }
    }

    info!("Downloading {}...", file_name);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(traineddata_url(lang))
        .header("User-Agent", "delta-buyer")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}: HTTP {}",
            file_name,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = fs::File::create(&target)?;
    file.write_all(&bytes)?;

    info!("Downloaded {} ({} bytes)", file_name, bytes.len());
    Ok(())
}

/// Finds the Tesseract executable, checking our local dir first, then system
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let local_exe = get_tesseract_dir().join(executable_name());
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for dir in COMMON_INSTALL_DIRS {
        let p = PathBuf::from(dir).join(executable_name());
        if p.exists() {
            return Ok(p);
        }
    }

    warn!("Download Tesseract from https://github.com/UB-Mannheim/tesseract/releases");
    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR, add it to PATH, or copy it to {}",
        get_tesseract_dir().display()
    ))
}

/// Finds a tessdata directory holding every language in `languages`.
pub fn find_tessdata_dir(languages: &[&str]) -> Option<PathBuf> {
    let mut candidates = vec![get_tesseract_dir().join("tessdata")];
    candidates.extend(
        COMMON_INSTALL_DIRS
            .iter()
            .map(|dir| PathBuf::from(dir).join("tessdata")),
    );

    // TESSDATA_PREFIX may point at the tessdata dir or its parent
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let prefix = PathBuf::from(prefix);
        candidates.push(prefix.join("tessdata"));
        candidates.push(prefix);
    }

    candidates
        .into_iter()
        .find(|dir| tessdata_has(dir, languages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tessdata_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!tessdata_has(dir.path(), &REQUIRED_LANGUAGES));
        assert_eq!(
            missing_languages(dir.path(), &REQUIRED_LANGUAGES),
            vec!["eng", "chi_sim"]
        );

        fs::write(dir.path().join("eng.traineddata"), b"x").unwrap();
        assert!(tessdata_has(dir.path(), &["eng"]));
        assert_eq!(missing_languages(dir.path(), &REQUIRED_LANGUAGES), vec!["chi_sim"]);

        fs::write(dir.path().join("chi_sim.traineddata"), b"x").unwrap();
        assert!(tessdata_has(dir.path(), &REQUIRED_LANGUAGES));
    }

    #[test]
    fn test_traineddata_url() {
        assert_eq!(
            traineddata_url("chi_sim"),
            "https://github.com/tesseract-ocr/tessdata/raw/main/chi_sim.traineddata"
        );
    }
}
