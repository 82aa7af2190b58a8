#![no_std]
#![no_main]

use core::net::Ipv4Addr;

use esp_hal::clock::CpuClock;
use esp_hal::rmt::{Rmt, TxChannelCreator};
use esp_hal::rng::Rng;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};

extern crate alloc;

// WiFi imports
use esp_wifi::wifi;

// Embassy imports
use embassy_executor::Spawner;
use embassy_net::{Config, Ipv4Cidr, Stack, StackResources, StaticConfigV4};
use embassy_time::{Delay, Duration, Instant, Timer};
use esp_hal_embassy::Executor;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

// Import our library modules
use alert_board_rs::alert_fetcher::HttpAlertSource;
use alert_board_rs::config;
use alert_board_rs::credentials::CredentialStore;
use alert_board_rs::device::{Device, StepOutcome};
use alert_board_rs::led_control::{LedController, PixelMap, RmtLedStrip};
use alert_board_rs::portal::{CredentialChannel, PortalServer};
use alert_board_rs::wifi::WiFiManager;

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

/// Pause between two loop iterations
const LOOP_INTERVAL_MS: u64 = 100;

type LedChannel = esp_hal::rmt::Channel<esp_hal::Blocking, 0>;
type AppDevice = Device<
    'static,
    WiFiManager<'static>,
    FlashStorage,
    RmtLedStrip<LedChannel>,
    HttpAlertSource,
    PortalServer,
    Delay,
>;

// Static cells for embassy components
static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
static STA_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static AP_RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();
static CREDENTIAL_CHANNEL: StaticCell<CredentialChannel> = StaticCell::new();
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    esp_println::println!("[PANIC] {}", info);
    loop {}
}

// Embassy task to run a network stack
#[embassy_executor::task(pool_size = 2)]
async fn net_task(
    mut runner: embassy_net::Runner<'static, esp_wifi::wifi::WifiDevice<'static>>,
) -> ! {
    runner.run().await
}

/// Cooperative main loop
#[embassy_executor::task]
async fn app_task(mut device: AppDevice) -> ! {
    info!("[STATE] Starting main loop");

    loop {
        // Truncation is fine, the fetch timer compares with wrapping arithmetic
        let now_ms = Instant::now().as_millis() as u32;
        if device.step(now_ms).await == StepOutcome::Restart {
            info!("[STATE] Restarting to apply new credentials");
            esp_hal::system::software_reset();
        }

        // Small delay to prevent busy loop
        Timer::after(Duration::from_millis(LOOP_INTERVAL_MS)).await;
    }
}

fn portal_config() -> Config {
    let ip = Ipv4Addr::from(config::PORTAL_IP);
    Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(ip, 24),
        gateway: Some(ip),
        dns_servers: Default::default(),
    })
}

fn spawn_app(spawner: Spawner, device: AppDevice) {
    if spawner.spawn(app_task(device)).is_err() {
        error!("[MAIN] Failed to spawn main loop");
    }
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();
    info!("[MAIN] Alert map board {}", alert_board_rs::VERSION);

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    // Initialize heap allocator for WiFi (72KB)
    esp_alloc::heap_allocator!(size: 72 * 1024);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    // Initialize WiFi driver
    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let mut rng = Rng::new(peripherals.RNG);
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let wifi_init = esp_wifi::init(timer_group1.timer0, rng, peripherals.RADIO_CLK)
        .expect("WiFi driver initialization failed");
    let wifi_init = WIFI_INIT_CELL.init(wifi_init);

    let (wifi_controller, interfaces) =
        wifi::new(wifi_init, peripherals.WIFI).expect("WiFi controller creation failed");
    info!("[WIFI] WiFi controller and interfaces created");

    // Station stack uses DHCP, the setup access point a fixed address
    let (sta_stack, sta_runner) = embassy_net::new(
        interfaces.sta,
        Config::dhcpv4(Default::default()),
        STA_RESOURCES.init(StackResources::new()),
        seed,
    );
    let (ap_stack, ap_runner) = embassy_net::new(
        interfaces.ap,
        portal_config(),
        AP_RESOURCES.init(StackResources::new()),
        seed.rotate_left(17),
    );
    let sta_stack: Stack<'static> = sta_stack;

    // WS2812 strip on RMT channel 0, 10MHz for WS2812 timing
    info!(
        "[LED] Setting up GPIO pin {} for LED data...",
        config::LED_DATA_PIN
    );
    let rmt = Rmt::new(peripherals.RMT, Rate::from_mhz(10)).expect("RMT initialization failed");
    let tx_config = esp_hal::rmt::TxChannelConfig::default()
        .with_clk_divider(1)
        .with_idle_output_level(esp_hal::gpio::Level::Low)
        .with_idle_output(false)
        .with_carrier_modulation(false);
    let rmt_channel: LedChannel = rmt
        .channel0
        .configure(peripherals.GPIO4, tx_config)
        .expect("RMT channel configuration failed");

    let pixel_map = match PixelMap::new(config::PIXEL_REGIONS, config::REGIONS_COUNT) {
        Ok(map) => map,
        Err(e) => {
            error!("[LED] {}, falling back to one pixel per region", e);
            PixelMap::Identity(config::REGIONS_COUNT)
        }
    };
    let leds = LedController::new(RmtLedStrip::new(rmt_channel), pixel_map);

    let store = CredentialStore::new(FlashStorage::new(), config::CREDENTIALS_FLASH_OFFSET);
    let radio = WiFiManager::new(wifi_controller);
    let source = HttpAlertSource::new(sta_stack, config::ALERT_URL);
    let channel = CREDENTIAL_CHANNEL.init(CredentialChannel::new());

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        info!("[MAIN] Spawning network tasks...");
        spawner.spawn(net_task(sta_runner)).ok();
        spawner.spawn(net_task(ap_runner)).ok();

        let portal = PortalServer::new(spawner, ap_stack, channel);
        let device = Device::new(store, leds, radio, source, portal, Delay);
        spawn_app(spawner, device);
    })
}
