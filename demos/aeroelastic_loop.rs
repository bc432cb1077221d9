use linss::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DT: Scalar = 0.05;

/// Two-mass structure with spring coupling, forces in, displacements out.
fn structure() -> Result<StateSpace, LinssError> {
    let stiffness = RMatrix::from_row_slice(2, 2, &[4.0, -1.0, -1.0, 3.0]);
    let damping = &stiffness * 0.05;
    let mut a = RMatrix::zeros(4, 4);
    a.view_mut((0, 2), (2, 2)).fill_with_identity();
    a.view_mut((2, 0), (2, 2)).copy_from(&(-&stiffness));
    a.view_mut((2, 2), (2, 2)).copy_from(&(-&damping));
    let mut b = RMatrix::zeros(4, 2);
    b.view_mut((2, 0), (2, 2)).fill_with_identity();
    let mut c = RMatrix::zeros(2, 4);
    c.view_mut((0, 0), (2, 2)).fill_with_identity();
    StateSpace::continuous(a, b, c, RMatrix::zeros(2, 2))?.cont2disc(DT)
}

/// Lagged aerodynamic loads driven by the displacements.
fn aerodynamics() -> Result<StateSpace, LinssError> {
    StateSpace::discrete(
        RMatrix::identity(2, 2) * 0.8,
        RMatrix::identity(2, 2) * 0.2,
        RMatrix::identity(2, 2) * -0.5,
        RMatrix::from_row_slice(2, 2, &[0.3, 0.06, 0.0, 0.3]),
        DT,
    )
}

fn main() -> Result<(), LinssError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let structure = structure()?;
    let aero = aerodynamics()?;
    let unit = Matrix::identity(2, Representation::Dense);
    let closed = couple(&structure, &aero, &unit, &unit)?;
    println!("{closed}");

    let eigs = closed.eigvals();
    let freqs = get_freq_from_eigs(&eigs, true);
    println!("spectral radius: {:.4}", closed.max_eig()?);
    for (eig, f) in eigs.iter().zip(&freqs).filter(|(_, f)| **f > 0.0) {
        println!("mode |λ| = {:.4}, f = {:.4} Hz", eig.norm(), f / DT);
    }

    let filter = butter(2, Cutoff::Single(0.4), closed.outputs(), FilterKind::Lowpass)?.into_state_space(Some(DT))?;
    let filtered = series(&closed, &filter)?;

    let omegas = linspace(0.01, std::f64::consts::PI / DT, 400);
    let response = filtered.freqresp(&omegas)?;
    let trace = response.channel(0, 0)?;
    let gain = mag_db(trace.iter().copied());
    let mut angle = phase(trace.iter().copied(), PhaseUnit::Degrees);
    adjust_phase(&mut angle, PhaseUnit::Degrees);

    println!("omega(rad/s), gain(dB), phase(deg)");
    for ((w, g), p) in omegas.iter().zip(&gain).zip(&angle).step_by(40) {
        println!("{w:.4}, {g:.3}, {p:.2}");
    }
    println!(
        "H2 = {:.4e}, Hinf = {:.4e}",
        h_norm(&trace, NormKind::H2)?,
        h_norm(&trace, NormKind::HInfinity)?
    );
    Ok(())
}
