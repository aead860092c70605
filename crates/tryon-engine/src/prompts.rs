pub const TRY_ON_INSTRUCTION: &str = "Create a new image showing the person wearing the clothing item from the second image.
Generate a realistic virtual try-on result by combining both images.
The output must be an image, not text.";

/// Second-attempt instruction. Must differ from [`TRY_ON_INSTRUCTION`].
pub const STRICT_RETRY_INSTRUCTION: &str = "Generate an image showing the person from the first image wearing the clothing from the second image.
Create a photorealistic virtual try-on result.
Output must be an image only. Do not reply with text, descriptions or explanations.";

pub const ANALYSIS_INSTRUCTION: &str =
    "Briefly describe the person (clothing, pose, lighting, background).";

pub fn closing_note(note: &str) -> Option<String> {
    let trimmed = note.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(
        "Keep the face, body shape, skin tone, hair and pose unchanged. {trimmed}"
    ))
}
