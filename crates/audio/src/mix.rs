//! Misch-Routinen – Saettigende Summe von PCM-Frames
//!
//! Der Mixer akkumuliert alle Beitraege eines Ticks in einem i32-Puffer und
//! klemmt erst beim Abschluss auf den i16-Wertebereich. Damit ist das
//! Ergebnis exakt `clamp(Summe, -32768, 32767)` pro Sample und unabhaengig
//! von der Reihenfolge der Beitraege. Bei maximal 4 Peers kann die
//! i32-Summe nicht ueberlaufen.

/// Addiert einen PCM-Frame auf den Akkumulator
///
/// Beide Slices muessen gleich lang sein.
pub fn frame_mischen(akku: &mut [i32], pcm: &[i16]) {
    debug_assert_eq!(akku.len(), pcm.len());
    for (summe, &sample) in akku.iter_mut().zip(pcm) {
        *summe += i32::from(sample);
    }
}

/// Schliesst den Akkumulator ab: klemmt jede Summe auf den i16-Bereich
pub fn akku_abschliessen(akku: &[i32], ziel: &mut [i16]) {
    debug_assert_eq!(akku.len(), ziel.len());
    for (sample, &summe) in ziel.iter_mut().zip(akku) {
        *sample = summe.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Referenz: clamp der vollstaendigen Summe pro Sample
    fn referenz_mix(frames: &[Vec<i16>]) -> Vec<i16> {
        let laenge = frames[0].len();
        (0..laenge)
            .map(|i| {
                let summe: i32 = frames.iter().map(|f| i32::from(f[i])).sum();
                summe.clamp(-32768, 32767) as i16
            })
            .collect()
    }

    fn mischen(frames: &[Vec<i16>]) -> Vec<i16> {
        let laenge = frames[0].len();
        let mut akku = vec![0i32; laenge];
        for frame in frames {
            frame_mischen(&mut akku, frame);
        }
        let mut ziel = vec![0i16; laenge];
        akku_abschliessen(&akku, &mut ziel);
        ziel
    }

    #[test]
    fn einfache_summe() {
        let ergebnis = mischen(&[vec![100; 4], vec![200; 4]]);
        assert_eq!(ergebnis, vec![300; 4]);
    }

    #[test]
    fn klemmt_an_der_oberen_grenze() {
        let ergebnis = mischen(&[vec![30_000; 4], vec![20_000; 4]]);
        assert_eq!(ergebnis, vec![32_767; 4]);
    }

    #[test]
    fn klemmt_an_der_unteren_grenze() {
        let ergebnis = mischen(&[vec![-30_000; 4], vec![-20_000; 4]]);
        assert_eq!(ergebnis, vec![-32_768; 4]);
    }

    #[test]
    fn reihenfolge_unabhaengig_trotz_klemmen() {
        // Sequenzielles Klemmen wuerde hier je nach Reihenfolge verschiedene
        // Ergebnisse liefern; die Akkumulator-Variante nicht.
        let frames = vec![vec![32_000; 2], vec![32_000; 2], vec![-32_000; 2]];
        let erwartet = referenz_mix(&frames);

        let mut vertauscht = frames.clone();
        vertauscht.swap(0, 2);

        assert_eq!(mischen(&frames), erwartet);
        assert_eq!(mischen(&vertauscht), erwartet);
        assert_eq!(erwartet, vec![32_000; 2]);
    }

    #[test]
    fn entspricht_referenz_fuer_gemischte_werte() {
        let frames = vec![
            vec![0, 1, -1, 32_767, -32_768, 1000],
            vec![0, -1, -1, 32_767, -32_768, 2000],
            vec![5, 0, 3, 100, -100, -4000],
        ];
        assert_eq!(mischen(&frames), referenz_mix(&frames));
    }

    #[test]
    fn vier_maximalpegel_ueberlaufen_nicht() {
        // 4 * 32767 passt bequem in i32; Ergebnis klemmt auf 32767
        let frames = vec![vec![32_767; 3]; 4];
        assert_eq!(mischen(&frames), vec![32_767; 3]);
    }

    #[test]
    fn einzelner_frame_bleibt_unveraendert() {
        let frame = vec![-5, 0, 5, 12_345];
        assert_eq!(mischen(&[frame.clone()]), frame);
    }
}
