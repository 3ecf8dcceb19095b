use std::convert::TryFrom;
use std::time::Duration;

/// Tunables for a replica. Every field is optional; unset fields take defaults.
#[derive(Clone, Debug, Default)]
pub struct ReplicaOptions {
    pub topology_role_name: Option<String>,
    pub topology_lease_duration: Option<Duration>,
    pub monitor_role_name: Option<String>,
    pub monitor_period: Option<Duration>,
    pub poll_interval: Option<Duration>,
    pub topic_id: Option<String>,
    pub subscription_id: Option<String>,
    pub ack_deadline: Option<Duration>,
    pub consumer_batch_size: Option<usize>,
    pub consumer_idle_delay: Option<Duration>,
    pub lease_buffer: Option<Duration>,
}

#[derive(Clone, Debug)]
pub(crate) struct ReplicaOptionsValidated {
    pub topology_role_name: String,
    pub topology_lease_duration: Duration,
    pub monitor_role_name: String,
    pub monitor_period: Duration,
    pub poll_interval: Duration,
    pub topic_id: String,
    pub subscription_id: String,
    pub ack_deadline: Duration,
    pub consumer_batch_size: usize,
    pub consumer_idle_delay: Duration,
    pub lease_buffer: Duration,
}

impl ReplicaOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.topology_role_name.is_empty() || self.monitor_role_name.is_empty() {
            return Err("Role names must not be empty");
        }
        if self.topology_role_name == self.monitor_role_name {
            return Err("Topology and monitor roles must be distinct");
        }
        if self.topic_id.is_empty() || self.subscription_id.is_empty() {
            return Err("Topic and subscription IDs must not be empty");
        }
        if self.topology_lease_duration.is_zero()
            || self.monitor_period.is_zero()
            || self.poll_interval.is_zero()
            || self.ack_deadline.is_zero()
            || self.consumer_idle_delay.is_zero()
        {
            return Err("Durations must be positive");
        }
        if self.consumer_batch_size == 0 {
            return Err("Consumer batch size must be positive");
        }
        if self.lease_buffer >= self.monitor_period {
            return Err("Lease buffer must be less than the monitor period");
        }

        Ok(())
    }
}

impl TryFrom<ReplicaOptions> for ReplicaOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ReplicaOptions) -> Result<Self, Self::Error> {
        let values = ReplicaOptionsValidated {
            topology_role_name: options
                .topology_role_name
                .unwrap_or_else(|| "topology-manager".to_string()),
            topology_lease_duration: options.topology_lease_duration.unwrap_or(Duration::from_secs(15)),
            monitor_role_name: options
                .monitor_role_name
                .unwrap_or_else(|| "topology-monitor".to_string()),
            monitor_period: options.monitor_period.unwrap_or(Duration::from_secs(2)),
            poll_interval: options.poll_interval.unwrap_or(Duration::from_secs(1)),
            topic_id: options.topic_id.unwrap_or_else(|| "messages".to_string()),
            subscription_id: options
                .subscription_id
                .unwrap_or_else(|| "message-consumers".to_string()),
            ack_deadline: options.ack_deadline.unwrap_or(Duration::from_secs(60)),
            consumer_batch_size: options.consumer_batch_size.unwrap_or(10),
            consumer_idle_delay: options.consumer_idle_delay.unwrap_or(Duration::from_millis(250)),
            lease_buffer: options.lease_buffer.unwrap_or(Duration::from_millis(500)),
        };

        values.validate()?;
        Ok(values)
    }
}
