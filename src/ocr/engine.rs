use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::debug;

use super::setup::TesseractPaths;
use super::{TextMode, TextReader};

/// Runs the Tesseract executable once per image.
pub struct TesseractReader {
    paths: TesseractPaths,
}

impl TesseractReader {
    pub fn new(paths: TesseractPaths) -> Self {
        Self { paths }
    }
}

/// Tesseract arguments after the input and output names.
fn mode_args(mode: TextMode) -> Vec<String> {
    let mut args = vec![
        "-l".to_string(),
        mode.language().to_string(),
        // Assume a single uniform block of text
        "--psm".to_string(),
        "6".to_string(),
    ];
    if mode == TextMode::Digits {
        args.push("-c".to_string());
        args.push("tessedit_char_whitelist=0123456789,".to_string());
    }
    args
}

impl TextReader for TesseractReader {
    fn read_text(&self, image: &GrayImage, mode: TextMode) -> Result<String> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        image
            .save(temp_input.path())
            .context("Failed to write OCR input image")?;

        let output = Command::new(&self.paths.executable)
            .arg(temp_input.path())
            .arg("stdout")
            .arg("--tessdata-dir")
            .arg(&self.paths.tessdata)
            .args(mode_args(mode))
            .output()
            .with_context(|| format!("Failed to run {}", self.paths.executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(?mode, %text, "OCR result");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_mode_restricts_charset() {
        let args = mode_args(TextMode::Digits);
        assert_eq!(args[..2], ["-l", "eng"]);
        assert!(args.contains(&"tessedit_char_whitelist=0123456789,".to_string()));
    }

    #[test]
    fn test_chinese_mode_uses_simplified_data() {
        let args = mode_args(TextMode::Chinese);
        assert_eq!(args, ["-l", "chi_sim", "--psm", "6"]);
    }
}
