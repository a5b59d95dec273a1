use serde::{Deserialize, Serialize};

pub const SCENE_CLASS: &str = "CreateScene";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConstraints {
    pub topic: Option<String>,
    pub grade_level: Option<String>,
    pub duration_minutes: f64,
    /// Class name the renderer will be asked to render.
    pub scene_class: String,
}

impl Default for GenerationConstraints {
    fn default() -> Self {
        Self {
            topic: None,
            grade_level: None,
            duration_minutes: 3.0,
            scene_class: SCENE_CLASS.to_string(),
        }
    }
}

impl GenerationConstraints {
    pub fn target_seconds(&self) -> u64 {
        if self.duration_minutes.is_finite() && self.duration_minutes > 0.0 {
            (self.duration_minutes * 60.0).round() as u64
        } else {
            180
        }
    }
}

/// Full instruction text sent to the model for one request.
pub fn build_prompt(prompt: &str, constraints: &GenerationConstraints) -> String {
    let topic = constraints
        .topic
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or("based on the prompt");
    let audience = constraints
        .grade_level
        .as_deref()
        .filter(|g| !g.trim().is_empty())
        .map(|g| format!("students at the {} level", g))
        .unwrap_or_else(|| "a general audience".to_string());

    let scene = if constraints.scene_class.trim().is_empty() {
        SCENE_CLASS
    } else {
        constraints.scene_class.trim()
    };

    format!(
        r#"You are an expert educational content creator who writes Manim animations.

Write Python code using the Manim Community library that produces an educational
video explaining: "{prompt}".

Topic: {topic}
Audience: {audience}
Target duration: approximately {seconds} seconds

Technical requirements:
1. Name the main scene class "{scene}".
2. Start the file with `from manim import *` and include every other import you need.
3. Use current Manim Community syntax.
4. Use color constants (RED, BLUE, GREEN) rather than strings.
5. Give animations explicit run_time values and use self.wait() so the total fits the target duration.
6. Do not use ZoomedScene, ThreeDScene or the display_frame keyword.
7. Only use TransformMatchingTex between Tex or MathTex objects.
8. End with self.play(FadeOut(*self.mobjects)).

Narration:
- Before each visual step, add a comment starting with `# NARRATION:` holding the sentence
  a narrator should say. Continue long sentences on following comment lines.
- Organise the scene in numbered sections marked with comments such as `# 1. Introduction`.

Return ONLY the Python code, without explanations or markdown."#,
        prompt = prompt.trim(),
        topic = topic,
        audience = audience,
        seconds = constraints.target_seconds(),
        scene = scene,
    )
}
