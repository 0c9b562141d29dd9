//! Deterministic cluster object names
//!
//! Every Job and ConfigMap created for a benchmark is named purely from the
//! (job id, benchmark id) pair, so anything holding those two ids can find or
//! delete the objects without a lookup table.
//!
//! Layout: `<prefix>-<job id, ≤8>-<benchmark id, ≤32>-<digest>`. The id
//! segments are normalized for readability only; uniqueness comes from the
//! digest, which is taken over the exact, unnormalized ids. Empty segments are
//! dropped. The result is always a valid RFC 1123 label of at most 63 chars.

use evalhub_common::kube_utils::{deterministic_hash, sanitize_dns_label};

/// Prefix for execution unit (Job) names
pub const JOB_NAME_PREFIX: &str = "eval-job";

/// Prefix for configuration object (ConfigMap) names
pub const CONFIG_MAP_NAME_PREFIX: &str = "eval-cfg";

const JOB_SEGMENT_LEN: usize = 8;
const BENCHMARK_SEGMENT_LEN: usize = 32;
const DIGEST_LEN: usize = 10;

/// Name of the Job that runs `benchmark_id` for `job_id`
pub fn job_name(job_id: &str, benchmark_id: &str) -> String {
    derive_name(JOB_NAME_PREFIX, job_id, benchmark_id)
}

/// Name of the ConfigMap holding the rendered parameters of `benchmark_id`
pub fn config_map_name(job_id: &str, benchmark_id: &str) -> String {
    derive_name(CONFIG_MAP_NAME_PREFIX, job_id, benchmark_id)
}

/// Both object names for one benchmark
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceNames {
    /// Job name
    pub job: String,
    /// ConfigMap name
    pub config_map: String,
}

impl ResourceNames {
    /// Derive the names for a (job id, benchmark id) pair
    pub fn for_benchmark(job_id: &str, benchmark_id: &str) -> Self {
        Self {
            job: job_name(job_id, benchmark_id),
            config_map: config_map_name(job_id, benchmark_id),
        }
    }
}

fn derive_name(prefix: &str, job_id: &str, benchmark_id: &str) -> String {
    let mut name = String::from(prefix);
    for segment in [
        sanitize_dns_label(job_id, JOB_SEGMENT_LEN),
        sanitize_dns_label(benchmark_id, BENCHMARK_SEGMENT_LEN),
    ] {
        if !segment.is_empty() {
            name.push('-');
            name.push_str(&segment);
        }
    }
    name.push('-');
    name.push_str(&pair_digest(job_id, benchmark_id));
    name
}

/// Length-prefixed so ("a-b", "c") and ("a", "b-c") hash differently
fn pair_digest(job_id: &str, benchmark_id: &str) -> String {
    let mut digest = deterministic_hash(&format!("{}:{}:{}", job_id.len(), job_id, benchmark_id));
    digest.truncate(DIGEST_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const JOB_ID: &str = "1936da05-2f27-4fd4-b000-ebcb71af1fbe";

    fn is_rfc1123_label(name: &str) -> bool {
        let bytes = name.as_bytes();
        !name.is_empty()
            && name.len() <= 63
            && bytes[0].is_ascii_alphanumeric()
            && bytes[bytes.len() - 1].is_ascii_alphanumeric()
            && bytes
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
    }

    #[test]
    fn names_are_deterministic() {
        assert_eq!(job_name(JOB_ID, "arc_easy"), job_name(JOB_ID, "arc_easy"));
        assert_eq!(
            config_map_name(JOB_ID, "arc_easy"),
            config_map_name(JOB_ID, "arc_easy")
        );
    }

    #[test]
    fn names_are_readable() {
        let name = job_name(JOB_ID, "arc_easy");
        assert!(name.starts_with("eval-job-1936da05-arc-easy-"), "{}", name);
        let cm = config_map_name(JOB_ID, "arc_easy");
        assert!(cm.starts_with("eval-cfg-1936da05-arc-easy-"), "{}", cm);
    }

    #[test]
    fn job_and_config_map_names_differ() {
        let names = ResourceNames::for_benchmark(JOB_ID, "arc");
        assert_ne!(names.job, names.config_map);
        assert_eq!(names.job, job_name(JOB_ID, "arc"));
        assert_eq!(names.config_map, config_map_name(JOB_ID, "arc"));
    }

    #[test]
    fn distinct_benchmarks_get_distinct_names() {
        // These all normalize to the same readable segment
        let ids = ["arc_easy", "arc-easy", "ARC_EASY", "arc.easy", "arc  easy", "arc"];
        let jobs: HashSet<_> = ids.iter().map(|id| job_name(JOB_ID, id)).collect();
        let cms: HashSet<_> = ids.iter().map(|id| config_map_name(JOB_ID, id)).collect();
        assert_eq!(jobs.len(), ids.len());
        assert_eq!(cms.len(), ids.len());

        let many: HashSet<_> = (0..2000)
            .map(|i| job_name(JOB_ID, &format!("bench-{}", i)))
            .collect();
        assert_eq!(many.len(), 2000);
    }

    #[test]
    fn segment_boundaries_do_not_collide() {
        assert_ne!(job_name("a-b", "c"), job_name("a", "b-c"));
        assert_ne!(job_name("ab", "c"), job_name("a", "bc"));
    }

    #[test]
    fn names_are_legal_for_arbitrary_input() {
        let printable: String = (0x20u8..0x7f).map(char::from).collect();
        let inputs = vec![
            String::new(),
            "-".to_string(),
            "___".to_string(),
            printable.clone(),
            printable.repeat(40),
            "UPPER/Case\\with:colons".to_string(),
            "x".repeat(10_000),
            "ünïcødé-ß".to_string(),
            "--leading-and-trailing--".to_string(),
        ];

        for job in &inputs {
            for bench in &inputs {
                let j = job_name(job, bench);
                let c = config_map_name(job, bench);
                assert!(is_rfc1123_label(&j), "illegal job name {:?}", j);
                assert!(is_rfc1123_label(&c), "illegal configmap name {:?}", c);
            }
        }

        for ch in printable.chars() {
            let id = ch.to_string();
            assert!(is_rfc1123_label(&job_name(&id, &id)));
        }
    }

    #[test]
    fn empty_segments_are_dropped() {
        let name = job_name("", "***");
        assert_eq!(name.len(), JOB_NAME_PREFIX.len() + 1 + DIGEST_LEN);
        assert!(is_rfc1123_label(&name));
    }
}
