// Copyright 2023 - 2024 Muxstream See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//
// Author: tickbh
// -----
// Created Date: 2024/01/17 09:42:25

use std::fmt;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

use crate::{Builder, ProtError, ProtResult};

/// 外部配置识别的选项, 未知选项一律拒绝
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct MuxOptions {
    pub max_bidirectional_streams: Option<u32>,
    pub max_unidirectional_streams: Option<u32>,
    pub idle_timeout: Option<IdleTimeout>,
}

/// 空闲超时: 毫秒数或字符串"infinite"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTimeout {
    Infinite,
    Millis(u64),
}

impl IdleTimeout {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            IdleTimeout::Infinite => None,
            IdleTimeout::Millis(ms) => Some(Duration::from_millis(*ms)),
        }
    }
}

impl<'de> Deserialize<'de> for IdleTimeout {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdleVisitor;

        impl<'de> Visitor<'de> for IdleVisitor {
            type Value = IdleTimeout;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("milliseconds or the string \"infinite\"")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<IdleTimeout, E> {
                Ok(IdleTimeout::Millis(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<IdleTimeout, E> {
                if value < 0 {
                    return Err(E::custom("idle_timeout must not be negative"));
                }
                Ok(IdleTimeout::Millis(value as u64))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<IdleTimeout, E> {
                if value.eq_ignore_ascii_case("infinite") {
                    Ok(IdleTimeout::Infinite)
                } else {
                    Err(E::custom(format!("unknown idle_timeout value: {}", value)))
                }
            }
        }

        deserializer.deserialize_any(IdleVisitor)
    }
}

impl MuxOptions {
    /// 从yaml文本解析, 出现不认识的选项返回`InvalidConfiguration`
    pub fn from_yaml(content: &str) -> ProtResult<MuxOptions> {
        serde_yaml::from_str(content).map_err(|e| ProtError::InvalidConfiguration(e.to_string()))
    }

    /// 应用到构造器, 未出现的选项保持原值
    pub fn apply(&self, mut builder: Builder) -> Builder {
        if let Some(max) = self.max_bidirectional_streams {
            builder.max_bidirectional_streams = max;
        }
        if let Some(max) = self.max_unidirectional_streams {
            builder.max_unidirectional_streams = max;
        }
        if let Some(idle) = &self.idle_timeout {
            builder.idle_timeout = idle.as_duration();
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options() {
        let options = MuxOptions::from_yaml(
            "max_bidirectional_streams: 8\nidle_timeout: 30000\n",
        )
        .unwrap();
        assert_eq!(options.max_bidirectional_streams, Some(8));
        assert_eq!(options.idle_timeout, Some(IdleTimeout::Millis(30000)));

        let options = MuxOptions::from_yaml("idle_timeout: infinite\n").unwrap();
        assert_eq!(options.idle_timeout, Some(IdleTimeout::Infinite));

        let builder = options.apply(Builder::new().idle_timeout(Some(Duration::from_secs(5))));
        assert_eq!(builder.idle_timeout, None);
    }

    #[test]
    fn unknown_option_rejected() {
        let err = MuxOptions::from_yaml("compression: gzip\n").unwrap_err();
        assert!(matches!(err, ProtError::InvalidConfiguration(_)));
    }
}
