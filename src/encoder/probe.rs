//! Hardware-encode availability probe (§4.5): before the first encode, try
//! a very short synthetic NVENC encode for the configured codec family and
//! cache the result for the process lifetime.

use tokio::sync::OnceCell;

use crate::domain::{CodecFamily, EncodeMode};

pub struct HardwareProbe {
    hevc: OnceCell<EncodeMode>,
    vp9: OnceCell<EncodeMode>,
}

impl Default for HardwareProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareProbe {
    pub fn new() -> Self {
        Self { hevc: OnceCell::new(), vp9: OnceCell::new() }
    }

    pub async fn mode_for(&self, family: CodecFamily, gpu_enabled: bool, force_gpu: bool) -> EncodeMode {
        if !gpu_enabled && !force_gpu {
            return EncodeMode::Cpu;
        }
        let cell = match family {
            CodecFamily::Hevc => &self.hevc,
            CodecFamily::Vp9 => &self.vp9,
        };
        *cell.get_or_init(|| probe_nvenc(family, force_gpu)).await
    }
}

async fn probe_nvenc(family: CodecFamily, force_gpu: bool) -> EncodeMode {
    let encoder_name = match family {
        CodecFamily::Hevc => "hevc_nvenc",
        CodecFamily::Vp9 => "vp9_nvenc",
    };

    let result = tokio::process::Command::new("ffmpeg")
        .args([
            "-f", "lavfi", "-i", "nullsrc=s=64x64:d=0.1",
            "-c:v", encoder_name,
            "-f", "null", "-",
        ])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await;

    match result {
        Ok(status) if status.success() => EncodeMode::Gpu,
        Ok(_) if force_gpu => {
            tracing::warn!(%encoder_name, "hardware probe failed but force_gpu is set, keeping gpu mode");
            EncodeMode::Gpu
        }
        Ok(_) => {
            tracing::warn!(%encoder_name, "hardware encode unavailable, downgrading to software");
            EncodeMode::Cpu
        }
        Err(e) => {
            tracing::warn!(%encoder_name, error = %e, "failed to spawn ffmpeg for hardware probe, downgrading to software");
            EncodeMode::Cpu
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gpu_disabled_short_circuits_without_probing() {
        let probe = HardwareProbe::new();
        let mode = probe.mode_for(CodecFamily::Hevc, false, false).await;
        assert_eq!(mode, EncodeMode::Cpu);
    }
}
