//! Emulator construction configuration.
//!
//! Replaces the global `TVSystem` constant the teacher's `PPU::new` took
//! directly with a small struct passed once to `Nes::new`, following the
//! same "pass configuration in, don't reach for globals" shape as the
//! teacher (`doublegate-rustyNES/src/ppu/mod.rs` already takes `TVSystem`
//! as a constructor argument; this just gathers the system-wide knobs spec.md
//! §5 names in one place).

use crate::ppu::TVSystem;

/// System-wide configuration for a [`crate::nes::Nes`] instance.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Master clock divider family (NTSC/PAL/Dendy), per spec.md §5.
    pub tv_system: TVSystem,

    /// Whether controller port 2 reports anything; some test ROMs rely on
    /// reading back open-bus bits when no controller is plugged in.
    pub controller2_connected: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            tv_system: TVSystem::NTSC,
            controller2_connected: true,
        }
    }
}

impl SystemConfig {
    pub fn ntsc() -> Self {
        SystemConfig { tv_system: TVSystem::NTSC, ..Default::default() }
    }

    pub fn pal() -> Self {
        SystemConfig { tv_system: TVSystem::PAL, ..Default::default() }
    }

    pub fn dendy() -> Self {
        SystemConfig { tv_system: TVSystem::Dendy, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_ntsc() {
        let cfg = SystemConfig::default();
        assert!(matches!(cfg.tv_system, TVSystem::NTSC));
        assert!(cfg.controller2_connected);
    }
}
