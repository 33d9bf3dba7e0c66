use clap::Args;
use crawlhunt_core::{distance_meters, Coordinate};

#[derive(Args)]
pub struct DistanceArgs {
    #[arg(allow_negative_numbers = true)]
    lat1: f64,
    #[arg(allow_negative_numbers = true)]
    lon1: f64,
    #[arg(allow_negative_numbers = true)]
    lat2: f64,
    #[arg(allow_negative_numbers = true)]
    lon2: f64,
    /// Also report whether the distance is within this radius (meters)
    #[arg(long)]
    radius: Option<f64>,
}

pub fn run(args: DistanceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let from = Coordinate::new(args.lat1, args.lon1);
    let to = Coordinate::new(args.lat2, args.lon2);
    for c in [from, to] {
        if !c.is_valid() {
            return Err(format!("invalid coordinate: ({}, {})", c.latitude, c.longitude).into());
        }
    }

    let meters = distance_meters(&from, &to);
    println!("{meters:.1}");
    if let Some(radius) = args.radius {
        println!("within {radius} m: {}", meters <= radius);
    }
    Ok(())
}
