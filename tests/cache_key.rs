use panel_harness::cache::{settings_hash, EvaluationCacheKey};
use panel_harness::judge::JudgeSettings;
use panel_harness::prompts::panel_template_hash;
use panel_harness::rubric::PerJudge;
use panel_harness::submission::SubmissionContent;

fn settings() -> String {
    settings_hash(&PerJudge::new(0.3, 0.4, 0.3), &JudgeSettings::default())
}

fn content(problem: &str, slides: &str, visual: &str) -> SubmissionContent {
    SubmissionContent::new(problem, slides, visual)
}

#[test]
fn evaluation_cache_key_is_stable_and_sensitive_to_inputs() {
    let base = content("Clinics lose records", "Offline sync", "Visual:10/15");
    let key1 = EvaluationCacheKey::new("llama3.1", panel_template_hash(), &settings(), &base);
    let key2 = EvaluationCacheKey::new("llama3.1", panel_template_hash(), &settings(), &base);

    assert_eq!(key1, key2);
    assert_eq!(key1.key_hash.len(), 64);

    let changed = content("Clinics lose records", "Offline sync (v2)", "Visual:10/15");
    let key3 = EvaluationCacheKey::new("llama3.1", panel_template_hash(), &settings(), &changed);
    assert_ne!(key1.key_hash, key3.key_hash);
    assert_ne!(key1.content_hash, key3.content_hash);
    assert_eq!(key1.problem_hash, key3.problem_hash);
    assert_eq!(key1.visual_hash, key3.visual_hash);
}

#[test]
fn evaluation_cache_key_depends_on_model_and_templates() {
    let base = content("p", "c", "v");
    let llama = EvaluationCacheKey::new("llama3.1", panel_template_hash(), &settings(), &base);
    let qwen = EvaluationCacheKey::new("qwen2.5", panel_template_hash(), &settings(), &base);
    let old_templates = EvaluationCacheKey::new("llama3.1", "older-template-hash", &settings(), &base);

    assert_ne!(llama.key_hash, qwen.key_hash);
    assert_ne!(llama.key_hash, old_templates.key_hash);
}

#[test]
fn evaluation_cache_key_does_not_confuse_field_boundaries() {
    let a = content("ab", "c", "");
    let b = content("a", "bc", "");
    let ka = EvaluationCacheKey::new("m", "t", "s", &a);
    let kb = EvaluationCacheKey::new("m", "t", "s", &b);
    assert_ne!(ka.key_hash, kb.key_hash);
}

#[test]
fn evaluation_cache_key_depends_on_weights_and_judge_settings() {
    let base = content("p", "c", "v");
    let defaults = JudgeSettings::default();
    let key_for = |weights: PerJudge<f64>, settings: &JudgeSettings| {
        EvaluationCacheKey::new(
            "llama3.1",
            panel_template_hash(),
            &settings_hash(&weights, settings),
            &base,
        )
        .key_hash
    };

    let baseline = key_for(PerJudge::new(0.3, 0.4, 0.3), &defaults);
    assert_eq!(baseline, key_for(PerJudge::new(0.3, 0.4, 0.3), &defaults));
    assert_ne!(baseline, key_for(PerJudge::new(0.2, 0.4, 0.4), &defaults));

    let mut hotter = defaults;
    hotter.temperature = 0.7;
    assert_ne!(baseline, key_for(PerJudge::new(0.3, 0.4, 0.3), &hotter));

    let mut shorter = defaults;
    shorter.max_tokens = 600;
    assert_ne!(baseline, key_for(PerJudge::new(0.3, 0.4, 0.3), &shorter));

    let mut tighter = defaults;
    tighter.budget.content_tokens /= 2;
    assert_ne!(baseline, key_for(PerJudge::new(0.3, 0.4, 0.3), &tighter));
}
