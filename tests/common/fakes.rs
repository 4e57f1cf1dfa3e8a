//! In-memory remote job service

use async_trait::async_trait;
use genbatch::remote::{CreateJobRequest, RemoteApi};
use genbatch::{JobId, PollError, RemoteJob, SubmissionError};
use std::collections::HashMap;
use std::sync::Mutex;

/// How a fake job behaves once created
#[derive(Clone, Debug)]
pub enum Behaviour {
    /// Report RUNNING for `polls` observations, then SUCCEEDED with `url`
    SucceedAfter { polls: usize, url: String },
    /// Report FAILED with `reason` on the first observation
    Fail { reason: String },
    /// Report RUNNING forever
    Hang,
}

/// Remote service whose jobs follow a per-input [`Behaviour`]
///
/// Job ids are the input file stem, so input `images/a.png` becomes job `a`.
#[derive(Default)]
pub struct FakeService {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    observed: Mutex<HashMap<JobId, usize>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, input_ref: &str, behaviour: Behaviour) -> Self {
        self.behaviours
            .lock()
            .expect("lock")
            .insert(input_ref.to_string(), behaviour);
        self
    }

    /// Number of status calls made for a job
    pub fn polls(&self, job_id: &str) -> usize {
        self.observed
            .lock()
            .expect("lock")
            .get(&JobId::from(job_id))
            .copied()
            .unwrap_or(0)
    }

    fn behaviour_for(&self, job_id: &JobId) -> Option<Behaviour> {
        self.behaviours
            .lock()
            .expect("lock")
            .iter()
            .find(|(input, _)| stem(input) == job_id.as_str())
            .map(|(_, b)| b.clone())
    }
}

fn stem(input_ref: &str) -> &str {
    let name = input_ref.rsplit('/').next().unwrap_or(input_ref);
    name.split('.').next().unwrap_or(name)
}

#[async_trait]
impl RemoteApi for FakeService {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<JobId, SubmissionError> {
        if !self
            .behaviours
            .lock()
            .expect("lock")
            .contains_key(&request.input_ref)
        {
            return Err(SubmissionError::InvalidInput {
                input_ref: request.input_ref.clone(),
                reason: "unknown input".to_string(),
            });
        }
        Ok(JobId::from(stem(&request.input_ref)))
    }

    async fn get_job(&self, job_id: &JobId) -> Result<RemoteJob, PollError> {
        let seen = {
            let mut observed = self.observed.lock().expect("lock");
            let count = observed.entry(job_id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let job = |status: &str| RemoteJob {
            id: job_id.to_string(),
            status: status.to_string(),
            ..Default::default()
        };

        match self.behaviour_for(job_id) {
            Some(Behaviour::SucceedAfter { polls, url }) if seen > polls => Ok(RemoteJob {
                output: vec![url],
                ..job("SUCCEEDED")
            }),
            Some(Behaviour::Fail { reason }) => Ok(RemoteJob {
                failure_reason: Some(reason),
                ..job("FAILED")
            }),
            Some(_) => Ok(job("RUNNING")),
            None => Err(PollError::Status {
                status: 404,
                message: "not found".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}
