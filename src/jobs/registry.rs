use std::collections::HashMap;
use std::sync::Arc;

use crate::jobs::types::{JobBody, JobType};

/// Registry mapping job types to their bodies
#[derive(Default, Clone)]
pub struct JobRegistry {
    bodies: HashMap<JobType, Arc<dyn JobBody>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body under its job type. A later registration wins.
    pub fn register<B: JobBody + 'static>(&mut self, body: B) -> &mut Self {
        self.bodies.insert(body.job_type(), Arc::new(body));
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobBody>> {
        self.bodies.get(&job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.bodies.keys().copied().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::jobs::types::{JobContext, JobReport};
    use async_trait::async_trait;

    struct Noop(JobType);

    #[async_trait]
    impl JobBody for Noop {
        fn job_type(&self) -> JobType {
            self.0
        }

        async fn run(&self, _ctx: &JobContext) -> AppResult<JobReport> {
            Ok(JobReport::default())
        }
    }

    #[test]
    fn test_register_by_job_type() {
        let mut registry = JobRegistry::new();
        registry
            .register(Noop(JobType::DataCleanup))
            .register(Noop(JobType::CacheRefresh));
        assert!(registry.get(JobType::DataCleanup).is_some());
        assert!(registry.get(JobType::QualityAssessment).is_none());
        assert_eq!(
            registry.job_types(),
            vec![JobType::CacheRefresh, JobType::DataCleanup]
        );
    }
}
