use crate::error::EngineError;
use crate::recognition::domain::face_template::{cosine_similarity, FaceTemplate, TemplateVersion};
use crate::recognition::domain::recognizable::Recognizable;
use crate::shared::constants::MAX_SIMILARITY_SCORE;

/// Similarity of two templates on the `0..=10` scale.
pub fn pair_score(a: &FaceTemplate, b: &FaceTemplate) -> f32 {
    let cos = cosine_similarity(a.values(), b.values()).clamp(0.0, 1.0);
    (cos * MAX_SIMILARITY_SCORE as f64) as f32
}

/// Best score over every subject × candidate pair.
///
/// Declared versions are checked before any data is decoded: all must be
/// equal and `Other` templates must also agree in length.
pub fn compare<S, C>(subjects: &[S], candidates: &[C]) -> Result<f32, EngineError>
where
    S: Recognizable,
    C: Recognizable,
{
    if subjects.is_empty() || candidates.is_empty() {
        return Err(EngineError::comparison(
            "subjects and candidates must not be empty",
        ));
    }
    check_versions(subjects, candidates)?;

    let subjects = decode_all(subjects)?;
    let candidates = decode_all(candidates)?;
    let best = subjects
        .iter()
        .flat_map(|s| candidates.iter().map(move |c| pair_score(s, c)))
        .fold(0.0f32, f32::max);
    log::trace!(
        "compared {}x{} templates, best score {best:.3}",
        subjects.len(),
        candidates.len()
    );
    Ok(best)
}

/// Candidates scoring at least `threshold` against `challenge`, as
/// `(index, score)` pairs ordered best first. Ties keep input order.
///
/// Version checks are the same as for [`compare`]. No candidates yields an
/// empty result.
pub fn find_similar<Q, C>(
    challenge: &Q,
    candidates: &[C],
    threshold: f32,
) -> Result<Vec<(usize, f32)>, EngineError>
where
    Q: Recognizable,
    C: Recognizable,
{
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let challenge = std::slice::from_ref(challenge);
    check_versions(challenge, candidates)?;

    let reference = decode_all(challenge)?;
    let candidates = decode_all(candidates)?;
    let mut matches: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, pair_score(&reference[0], c)))
        .filter(|(_, score)| *score >= threshold)
        .collect();
    matches.sort_by(|a, b| b.1.total_cmp(&a.1));
    log::trace!(
        "{} of {} candidates at or above {threshold:.2}",
        matches.len(),
        candidates.len()
    );
    Ok(matches)
}

fn check_versions<S: Recognizable, C: Recognizable>(
    subjects: &[S],
    candidates: &[C],
) -> Result<(), EngineError> {
    let expected = subjects[0].version();
    let other_len = (expected == TemplateVersion::Other)
        .then(|| subjects[0].recognition_data().len());

    let declared = subjects
        .iter()
        .map(|s| (s.version(), s.recognition_data().len()))
        .chain(candidates.iter().map(|c| (c.version(), c.recognition_data().len())));
    for (found, len) in declared {
        let length_differs = other_len.is_some_and(|l| l != len);
        if found != expected || length_differs {
            return Err(EngineError::TemplateVersionMismatch { expected, found });
        }
    }
    Ok(())
}

fn decode_all<R: Recognizable>(items: &[R]) -> Result<Vec<FaceTemplate>, EngineError> {
    items
        .iter()
        .map(|item| {
            let template = FaceTemplate::from_bytes(&item.recognition_data())
                .map_err(|e| EngineError::comparison(format!("undecodable template: {e}")))?;
            if template.version() != item.version() {
                return Err(EngineError::comparison(format!(
                    "template data is {:?} but was declared {:?}",
                    template.version(),
                    item.version()
                )));
            }
            Ok(template)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recognition::domain::face_template::l2_normalize;
    use crate::recognition::domain::recognizable::RecognitionData;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn template(version: TemplateVersion, len: usize, seed: f32) -> FaceTemplate {
        let mut values: Vec<f32> = (0..len).map(|i| (i as f32 * seed).sin() + 0.1).collect();
        l2_normalize(&mut values);
        FaceTemplate::from_values(version, values).unwrap()
    }

    #[rstest]
    #[case(TemplateVersion::V16, 128)]
    #[case(TemplateVersion::V20, 512)]
    #[case(TemplateVersion::V20A, 512)]
    #[case(TemplateVersion::Other, 64)]
    fn test_self_comparison_is_maximum(#[case] version: TemplateVersion, #[case] len: usize) {
        let t = template(version, len, 0.7);
        let score = compare(&[&t], &[&t]).unwrap();
        assert_relative_eq!(score, MAX_SIMILARITY_SCORE, epsilon = 1e-4);
    }

    #[test]
    fn test_orthogonal_and_opposite_score_zero() {
        let a = FaceTemplate::from_values(TemplateVersion::Other, vec![1.0, 0.0]).unwrap();
        let b = FaceTemplate::from_values(TemplateVersion::Other, vec![0.0, 1.0]).unwrap();
        let c = FaceTemplate::from_values(TemplateVersion::Other, vec![-1.0, 0.0]).unwrap();
        assert_relative_eq!(compare(&[&a], &[&b]).unwrap(), 0.0);
        assert_relative_eq!(compare(&[&a], &[&c]).unwrap(), 0.0);
    }

    #[test]
    fn test_best_pair_wins() {
        let a = FaceTemplate::from_values(TemplateVersion::Other, vec![1.0, 0.0]).unwrap();
        let b = FaceTemplate::from_values(TemplateVersion::Other, vec![0.0, 1.0]).unwrap();
        let c = FaceTemplate::from_values(TemplateVersion::Other, vec![0.6, 0.8]).unwrap();
        let score = compare(&[&a, &b], &[&c]).unwrap();
        assert_relative_eq!(score, 8.0, epsilon = 1e-5);
    }

    #[test]
    fn test_empty_inputs_fail() {
        let t = template(TemplateVersion::V16, 128, 0.3);
        let none: [&FaceTemplate; 0] = [];
        assert_eq!(
            compare(&none, &[&t]).unwrap_err().kind(),
            ErrorKind::FaceComparisonFailed
        );
        assert_eq!(
            compare(&[&t], &none).unwrap_err().kind(),
            ErrorKind::FaceComparisonFailed
        );
    }

    #[rstest]
    #[case(TemplateVersion::V16, 128, TemplateVersion::V20, 512)]
    #[case(TemplateVersion::V20, 512, TemplateVersion::V20A, 512)]
    #[case(TemplateVersion::Other, 512, TemplateVersion::V20, 512)]
    #[case(TemplateVersion::Other, 16, TemplateVersion::Other, 32)]
    fn test_version_mismatch(
        #[case] va: TemplateVersion,
        #[case] la: usize,
        #[case] vb: TemplateVersion,
        #[case] lb: usize,
    ) {
        let a = template(va, la, 0.2);
        let b = template(vb, lb, 0.2);
        let err = compare(&[&a], &[&b]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateVersionMismatch);
        let err = compare(&[&b], &[&a]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateVersionMismatch);
    }

    #[test]
    fn test_mismatch_within_subjects() {
        let a = template(TemplateVersion::V16, 128, 0.2);
        let b = template(TemplateVersion::V20, 512, 0.2);
        let err = compare(&[&a, &b], &[&a]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateVersionMismatch);
    }

    #[test]
    fn test_mismatch_reported_before_decoding() {
        let garbage = RecognitionData::new(vec![0xde, 0xad], TemplateVersion::V20);
        let t = template(TemplateVersion::V16, 128, 0.2);
        let err = compare(&[RecognitionData::from(&t)], &[garbage]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateVersionMismatch);
    }

    #[test]
    fn test_undecodable_data_fails() {
        let garbage = RecognitionData::new(vec![0xde, 0xad], TemplateVersion::V16);
        let t = RecognitionData::from(&template(TemplateVersion::V16, 128, 0.2));
        let err = compare(&[t], &[garbage]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FaceComparisonFailed);
    }

    #[test]
    fn test_declared_version_must_match_payload() {
        let v20 = template(TemplateVersion::V20, 512, 0.2);
        let mislabeled = RecognitionData::new(v20.to_bytes(), TemplateVersion::V20A);
        let err = compare(&[&mislabeled], &[&mislabeled]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FaceComparisonFailed);
    }

    #[test]
    fn test_stored_and_live_templates_compare() {
        let t = template(TemplateVersion::V20, 512, 0.9);
        let stored = RecognitionData::from(&t);
        let subjects: Vec<&dyn Recognizable> = vec![&stored];
        let candidates: Vec<&dyn Recognizable> = vec![&t];
        let score = compare(&subjects, &candidates).unwrap();
        assert_relative_eq!(score, MAX_SIMILARITY_SCORE, epsilon = 1e-4);
    }

    #[test]
    fn test_find_similar_picks_the_one_match() {
        use crate::recognition::template_generator::{
            generate_random_template, generate_template_with_score,
        };
        use crate::shared::constants::AUTHENTICATION_SCORE_THRESHOLD;

        let challenge = generate_random_template(TemplateVersion::V20).unwrap();
        let mut candidates: Vec<FaceTemplate> = (0..20)
            .map(|_| generate_template_with_score(1.0, &challenge).unwrap())
            .collect();
        candidates.insert(7, generate_template_with_score(6.0, &challenge).unwrap());

        let found = find_similar(&challenge, &candidates, AUTHENTICATION_SCORE_THRESHOLD).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 7);
        assert_relative_eq!(found[0].1, 6.0, epsilon = 1e-3);
    }

    #[test]
    fn test_find_similar_orders_best_first() {
        let a = FaceTemplate::from_values(TemplateVersion::Other, vec![1.0, 0.0]).unwrap();
        let candidates = [
            FaceTemplate::from_values(TemplateVersion::Other, vec![0.6, 0.8]).unwrap(),
            FaceTemplate::from_values(TemplateVersion::Other, vec![0.0, 1.0]).unwrap(),
            a.clone(),
        ];
        let found = find_similar(&a, &candidates, 0.0).unwrap();
        let order: Vec<usize> = found.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_find_similar_without_candidates_is_empty() {
        let t = template(TemplateVersion::V16, 128, 0.3);
        let none: [&FaceTemplate; 0] = [];
        assert!(find_similar(&t, &none, 4.0).unwrap().is_empty());
    }

    #[test]
    fn test_find_similar_checks_versions() {
        let a = template(TemplateVersion::V16, 128, 0.2);
        let b = template(TemplateVersion::V20, 512, 0.2);
        let err = find_similar(&a, &[&a, &b], 4.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateVersionMismatch);
    }
}
