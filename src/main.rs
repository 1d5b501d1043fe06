use artify::{
    logger::{self, LogLevel, LoggerConfig},
    supported_models, Config, Gallery, GenerateImageParams, GeneratedImage,
    ImageGenerationService, OutputFormat,
};
use std::env;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let level = env::var("ARTIFY_LOG")
        .ok()
        .and_then(|name| LogLevel::parse(&name))
        .unwrap_or(LogLevel::Debug);
    logger::init_with_config(LoggerConfig::development().with_level(level))?;

    if dotenv_loaded {
        log::info!(".env file loaded");
    } else {
        log::warn!("No .env file found, using system environment variables");
    }

    let config = Config::from_env();
    logger::log_config_info(&config);

    let service = ImageGenerationService::from_config(&config).await?;
    if let Some(key) = &config.runware.api_key {
        service.set_credential(key.clone()).await?;
    }

    match service.credential_masked().await {
        Some(masked) => log::info!("Using API key {}", masked),
        None => {
            log::error!("No API key found. Set RUNWARE_API_KEY or save one first.");
            return Ok(());
        }
    }

    log::info!("Available image generation models:");
    for model in supported_models() {
        log::info!("  {} - {} ({})", model.id, model.name, model.provider);
    }

    let prompt = env::args().skip(1).collect::<Vec<_>>().join(" ");
    let prompt = if prompt.trim().is_empty() {
        "A futuristic cityscape at sunset with flying cars".to_string()
    } else {
        prompt
    };

    let params = params_from_env(prompt)?;
    let mut gallery = Gallery::new();

    let mut timer = logger::timer("Image generation");
    let outcome = service.generate_all(&params).await;
    timer.stop();

    match outcome {
        Ok(images) => {
            for image in &images {
                log::info!("Image: {}", image.image_url);
                if let Some(seed) = image.seed {
                    log::info!("Seed: {}", seed);
                }
                if let Some(cost) = image.cost {
                    log::info!("Cost: {}", cost);
                }
                gallery.record(image, &params);
            }

            if let Ok(dir) = env::var("ARTIFY_SAVE_DIR") {
                let format = params.format.unwrap_or_default();
                for image in &images {
                    match save_image(image, Path::new(&dir), format).await {
                        Ok(path) => log::info!("Image saved to: {}", path.display()),
                        Err(e) => log::error!("Failed to save image: {}", e),
                    }
                }
            }
        }
        Err(e) => log::error!("Image generation failed: {}", e),
    }

    if let Some(exchange) = service.last_exchange().await {
        log::debug!(
            "Request: {}",
            serde_json::to_string_pretty(&exchange.request)?
        );
        if let Some(response) = &exchange.response {
            log::debug!("Response: {}", serde_json::to_string_pretty(response)?);
        }
    }

    log::info!("Gallery holds {} image(s)", gallery.len());
    service.disconnect().await;
    Ok(())
}

fn params_from_env(prompt: String) -> artify::Result<GenerateImageParams> {
    let mut params = GenerateImageParams::new(prompt);
    params.size = env::var("ARTIFY_SIZE").ok();
    params.seed = env::var("ARTIFY_SEED").ok();
    params.negative_prompt = env::var("ARTIFY_NEGATIVE_PROMPT").ok();
    params.model = env::var("ARTIFY_MODEL").ok();
    params.num_images = env::var("ARTIFY_NUM_IMAGES").ok().and_then(|n| n.parse().ok());
    params.steps = env::var("ARTIFY_STEPS").ok().and_then(|n| n.parse().ok());
    params.cfg_scale = env::var("ARTIFY_CFG_SCALE").ok().and_then(|n| n.parse().ok());
    if let Ok(format) = env::var("ARTIFY_FORMAT") {
        params.format = Some(format.parse::<OutputFormat>()?);
    }
    Ok(params)
}

async fn save_image(
    image: &GeneratedImage,
    dir: &Path,
    format: OutputFormat,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let bytes = reqwest::get(&image.image_url)
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    tokio::fs::create_dir_all(dir).await?;
    let name = image.image_uuid.as_deref().unwrap_or(&image.task_uuid);
    let path = dir.join(format!("{}.{}", name, format.extension()));
    tokio::fs::write(&path, &bytes).await?;
    Ok(path)
}
