use candle_core::Device;

pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) { tracing::info!("embedding device: metal (mps)"); return dev; }
    }
    tracing::info!("embedding device: cpu");
    Device::Cpu
}
