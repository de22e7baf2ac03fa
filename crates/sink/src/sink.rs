//! 하트비트 싱크 파이프라인
//!
//! `[sink]` 설정으로 소비자 하나와 생성기 N개를 묶어
//! core의 [`Pipeline`] 생명주기로 관리합니다.

use tracing::info;

use beacon_core::config::SinkConfig;
use beacon_core::error::{BeaconError, PipelineError};
use beacon_core::pipeline::{HealthStatus, Pipeline};

use crate::consumer::{MessageConsumer, MessageConsumerManager};
use crate::error::SinkError;
use crate::heartbeat::{Heartbeat, HeartbeatConsumer, HeartbeatGenerator, HeartbeatModule};
use crate::producer::ChannelProducer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Initialized,
    Running,
    Stopped,
}

/// 하트비트 싱크
pub struct HeartbeatSink {
    config: SinkConfig,
    state: SinkState,
    manager: MessageConsumerManager,
    consumer: HeartbeatConsumer,
    generators: Vec<HeartbeatGenerator<ChannelProducer<Heartbeat>>>,
}

impl HeartbeatSink {
    /// 설정을 검증하고 싱크를 생성합니다.
    pub fn new(config: SinkConfig) -> Result<Self, SinkError> {
        if config.consumer_threads == 0 {
            return Err(invalid("consumer_threads"));
        }
        if config.rate_per_generator == 0 {
            return Err(invalid("rate_per_generator"));
        }
        if config.channel_capacity == 0 {
            return Err(invalid("channel_capacity"));
        }

        Ok(Self {
            manager: MessageConsumerManager::new(config.channel_capacity),
            consumer: HeartbeatConsumer::new(HeartbeatModule::new(config.consumer_threads)),
            generators: Vec::new(),
            state: SinkState::Initialized,
            config,
        })
    }

    /// 모든 생성기가 보낸 하트비트 수
    pub fn sent(&self) -> u64 {
        self.generators.iter().map(HeartbeatGenerator::sent).sum()
    }

    /// 소비자가 받은 하트비트 수
    pub fn received(&self) -> u64 {
        self.consumer.received()
    }

    /// 현재 상태 이름
    pub fn state_name(&self) -> &'static str {
        match self.state {
            SinkState::Initialized => "initialized",
            SinkState::Running => "running",
            SinkState::Stopped => "stopped",
        }
    }
}

fn invalid(field: &str) -> SinkError {
    SinkError::Config {
        field: field.to_owned(),
        reason: "must be greater than 0".to_owned(),
    }
}

impl Pipeline for HeartbeatSink {
    async fn start(&mut self) -> Result<(), BeaconError> {
        if self.state == SinkState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        self.manager.register_consumer(self.consumer.clone())?;
        let producer = self.manager.producer(self.consumer.module())?;

        let mut generators = Vec::with_capacity(self.config.generators);
        for index in 0..self.config.generators {
            let mut generator =
                HeartbeatGenerator::new(index, producer.clone(), self.config.rate_per_generator)?;
            generator.start()?;
            generators.push(generator);
        }
        self.generators = generators;
        self.state = SinkState::Running;

        info!(
            generators = self.config.generators,
            rate_per_generator = self.config.rate_per_generator,
            consumer_threads = self.config.consumer_threads,
            "heartbeat sink started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BeaconError> {
        if self.state != SinkState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        for generator in &mut self.generators {
            generator.stop().await?;
        }
        self.manager.unregister_all().await;
        self.state = SinkState::Stopped;

        info!(sent = self.sent(), received = self.received(), "heartbeat sink stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            SinkState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            SinkState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
            SinkState::Running => match self.generators.iter().find(|g| !g.is_running()) {
                Some(generator) => HealthStatus::Degraded(format!(
                    "heartbeat generator {} stopped",
                    generator.index()
                )),
                None => HealthStatus::Healthy,
            },
        }
    }
}
