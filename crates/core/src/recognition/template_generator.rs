use rand::Rng;

use crate::error::EngineError;
use crate::recognition::domain::face_template::{l2_normalize, FaceTemplate, TemplateVersion};
use crate::recognition::domain::recognizable::Recognizable;
use crate::shared::constants::MAX_SIMILARITY_SCORE;

/// Uniformly random unit-length template of `version`.
pub fn generate_random_template(version: TemplateVersion) -> Result<FaceTemplate, EngineError> {
    let dimension = version.dimension().ok_or_else(|| {
        EngineError::generation(format!("{version:?} templates have no fixed dimension"))
    })?;
    let mut rng = rand::rng();
    let values = random_unit_vector(&mut rng, dimension)?;
    FaceTemplate::from_values(version, values).map_err(|e| EngineError::generation(e.to_string()))
}

/// Template that scores exactly `score` against `against`.
///
/// The result is `c·a + sqrt(1 - c²)·r` where `a` is the reference vector,
/// `c = score / 10` and `r` is a random unit vector orthogonal to `a`.
pub fn generate_template_with_score(
    score: f32,
    against: &dyn Recognizable,
) -> Result<FaceTemplate, EngineError> {
    if !(0.0..=MAX_SIMILARITY_SCORE).contains(&score) {
        return Err(EngineError::generation(format!(
            "score {score} is outside 0..={MAX_SIMILARITY_SCORE}"
        )));
    }
    let reference = FaceTemplate::from_bytes(&against.recognition_data())
        .map_err(|e| EngineError::generation(format!("reference template: {e}")))?;
    if reference.version() != against.version() {
        return Err(EngineError::generation(format!(
            "reference data is {:?} but was declared {:?}",
            reference.version(),
            against.version()
        )));
    }

    let mut a: Vec<f64> = reference.values().iter().map(|&v| v as f64).collect();
    if !normalize(&mut a) {
        return Err(EngineError::generation("reference template is all zeros"));
    }
    if a.len() < 2 && score < MAX_SIMILARITY_SCORE {
        return Err(EngineError::generation(
            "reference template is too short to derive a partial match",
        ));
    }

    let c = (score / MAX_SIMILARITY_SCORE) as f64;
    let mut rng = rand::rng();
    let r = orthogonal_unit_vector(&mut rng, &a)?;
    let s = (1.0 - c * c).max(0.0).sqrt();
    let mut values: Vec<f32> = a
        .iter()
        .zip(&r)
        .map(|(ai, ri)| (c * ai + s * ri) as f32)
        .collect();
    l2_normalize(&mut values);
    FaceTemplate::from_values(reference.version(), values)
        .map_err(|e| EngineError::generation(e.to_string()))
}

fn random_unit_vector<R: Rng>(rng: &mut R, dimension: usize) -> Result<Vec<f32>, EngineError> {
    for _ in 0..8 {
        let mut values: Vec<f32> = (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect();
        if values.iter().any(|v| *v != 0.0) {
            l2_normalize(&mut values);
            return Ok(values);
        }
    }
    Err(EngineError::generation("could not draw a non-zero vector"))
}

/// Random unit vector with the component along unit vector `a` removed.
fn orthogonal_unit_vector<R: Rng>(rng: &mut R, a: &[f64]) -> Result<Vec<f64>, EngineError> {
    if a.len() < 2 {
        return Ok(vec![0.0; a.len()]);
    }
    for _ in 0..8 {
        let mut r: Vec<f64> = (0..a.len()).map(|_| rng.random_range(-1.0..1.0)).collect();
        let along: f64 = r.iter().zip(a).map(|(ri, ai)| ri * ai).sum();
        for (ri, ai) in r.iter_mut().zip(a) {
            *ri -= along * ai;
        }
        if normalize(&mut r) {
            return Ok(r);
        }
    }
    Err(EngineError::generation("could not draw an orthogonal vector"))
}

fn normalize(v: &mut [f64]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm < 1e-9 {
        return false;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    true
}
