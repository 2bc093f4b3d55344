//! Synthetic run trees for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const HEADER: &str = "PCIe slot, core_x, core_y, RISC processor type, timer_id, time[cycles since reset], data, run host ID, zone name, type, source line, source file, meta data";

/// One kernel invocation on one core of a synthetic log.
#[derive(Debug, Clone, Copy)]
pub struct Kernel {
    pub x: u32,
    pub host_id: u64,
    pub length: u64,
    /// Data column of the single wait-front row, if any.
    pub wait_front: Option<u64>,
}

impl Kernel {
    pub fn new(x: u32, length: u64) -> Self {
        Self {
            x,
            host_id: 7,
            length,
            wait_front: None,
        }
    }

    pub fn wait_front(mut self, data: u64) -> Self {
        self.wait_front = Some(data);
        self
    }
}

/// Render a device log for `arch` holding `kernels`.
pub fn device_log(arch: &str, kernels: &[Kernel]) -> String {
    let mut text = format!("ARCH: {arch}, CHIP_FREQ[MHz]: 1000, Max Compute Cores: 64\n");
    text.push_str(HEADER);
    text.push('\n');
    for k in kernels {
        let (x, host, start, end) = (k.x, k.host_id, 100, 100 + k.length);
        text.push_str(&format!("0,{x},1,TRISC_0,1,{start},0,{host},TRISC-KERNEL,ZONE_START,10,k.cpp,\n"));
        text.push_str(&format!("0,{x},1,TRISC_1,1,{},0,{host},TRISC-KERNEL,ZONE_START,10,k.cpp,\n", start + 4));
        text.push_str(&format!("0,{x},1,TRISC_2,1,{},0,{host},TRISC-KERNEL,ZONE_START,10,k.cpp,\n", start + 8));
        text.push_str(&format!("0,{x},1,TRISC_0,1,{},0,{host},TRISC-KERNEL,ZONE_END,10,k.cpp,\n", end - 12));
        text.push_str(&format!("0,{x},1,TRISC_1,1,{},0,{host},TRISC-KERNEL,ZONE_END,10,k.cpp,\n", end - 6));
        text.push_str(&format!("0,{x},1,TRISC_2,1,{end},0,{host},TRISC-KERNEL,ZONE_END,10,k.cpp,\n"));
        if let Some(data) = k.wait_front {
            text.push_str(&format!(
                "0,{x},1,TRISC_1,2,{},{data},{host},CB-COMPUTE-WAIT-FRONT,ZONE_END,20,cb.h,\n",
                start + 50
            ));
        }
        // Data-movement rows are ignored.
        text.push_str(&format!("0,{x},1,BRISC,1,{start},0,{host},BRISC-KERNEL,ZONE_START,5,b.cpp,\n"));
    }
    text
}

/// Temporary `<root>/<variant>/<run>/reports/<test>/profile_log_device.csv` tree.
pub struct RunTree {
    dir: TempDir,
}

impl RunTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, variant: &str, run: usize, test_case: &str, text: &str) -> PathBuf {
        let dir = self
            .root()
            .join(variant)
            .join(run.to_string())
            .join("reports")
            .join(test_case);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("profile_log_device.csv");
        fs::write(&path, text).unwrap();
        path
    }

    /// One log per run, each with one kernel on core x=1.
    pub fn series(&self, variant: &str, test_case: &str, kernels: &[Kernel]) {
        for (run, k) in kernels.iter().enumerate() {
            self.write(variant, run, test_case, &device_log("wormhole_b0", &[*k]));
        }
    }
}

/// Kernels of the given lengths on core x=1.
pub fn lengths(values: &[u64]) -> Vec<Kernel> {
    values.iter().map(|&l| Kernel::new(1, l)).collect()
}
