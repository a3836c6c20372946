use std::path::Path;
use std::process::exit;
use std::time::Instant;

use log::info;

use vgg19::{ util, Snapshot, Tensor, Vgg19, Vgg19Config, CLASS_COUNT };


fn main() {
  env_logger::init();
  if let Err(error) = run() {
    eprintln!("{error}");
    exit(1);
  }
}

fn run() -> vgg19::Result<()> {
  let args: Vec<String> = std::env::args().skip(1).collect();
  if args.len() < 3 {
    eprintln!("usage: classify <classes.txt> <snapshot> <image[=class]>...");
    exit(2);
  }

  let classes = util::read_classes(&args[0])?;
  let snapshot = if Path::new(&args[1]).exists() {
    info!("restoring parameters from {}", args[1]);
    Some(Snapshot::load(&args[1])?)
  } else {
    info!("no snapshot at {}, starting from random parameters", args[1]);
    None
  };
  let mut network = Vgg19::new(Vgg19Config { snapshot, ..Vgg19Config::default() })?;

  let mut images = vec![];
  let mut labels = vec![];
  for arg in &args[2..] {
    let (path, label) = match arg.split_once('=') {
      Some((path, label)) => (path, label.parse::<u32>().ok()),
      None => (arg.as_str(), None),
    };
    images.push(util::load_image(path)?);
    labels.push(label);
  }
  let batch = util::batch_images(&images);

  let start = Instant::now();
  let probs = network.predict(&batch, false)?;
  info!("classified {} images in {:.1?}", images.len(), start.elapsed());

  for (i, arg) in args[2..].iter().enumerate() {
    println!("{arg}:");
    for (class, p) in util::top_k(&probs.at(&[i]), 5) {
      let name = classes.get(class).map(|name| name.as_str() ).unwrap_or("?");
      println!("  {:5.2}% {name}", p * 100.0);
    }
  }

  // With a class given for every image, run one training step and
  // persist the adjusted parameters
  if !labels.is_empty() && labels.iter().all(|label| label.is_some() ) {
    let wanted: Vec<u32> = labels.into_iter().flatten().collect();
    let hot = Tensor::vec(&wanted).one_hot::<f32>(CLASS_COUNT);
    let start = Instant::now();
    let loss = network.train_step(&batch, &hot)?;
    println!("training loss {loss:.4} ({:.1?})", start.elapsed());
    network.export().save(&args[1])?;
    info!("saved parameters to {}", args[1]);
  }
  Ok(())
}
