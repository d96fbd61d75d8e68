//! Periodic-table data used by the subsystem.
//!
//! The table is a per-instance field of the subsystem, populated once at
//! construction; independent subsystems carry independent tables.

/// RGB display color, each channel in [0, 1].
pub type Color = [f32; 3];

pub const GRAY: Color = [0.5, 0.5, 0.5];
pub const GREEN: Color = [0.0, 1.0, 0.0];
pub const BLUE: Color = [0.0, 0.0, 1.0];
pub const RED: Color = [1.0, 0.0, 0.0];
pub const MAGENTA: Color = [1.0, 0.0, 1.0];
pub const YELLOW: Color = [1.0, 1.0, 0.0];

/// A chemical element: atomic number, symbol, name, standard atomic mass
/// in daltons, and a default display color.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub atomic_number: u32,
    pub symbol: &'static str,
    pub name: &'static str,
    pub mass: f64,
    pub default_color: Color,
}

impl Element {
    fn new(atomic_number: u32, symbol: &'static str, name: &'static str, mass: f64) -> Self {
        debug_assert!(atomic_number >= 1 && mass > 0.0);
        Self {
            atomic_number,
            symbol,
            name,
            mass,
            default_color: GRAY,
        }
    }

    fn colored(mut self, color: Color) -> Self {
        self.default_color = color;
        self
    }
}

/// Lookup table over atomic numbers 1..=110.
#[derive(Debug, Clone)]
pub struct ElementTable {
    elements: Vec<Option<Element>>,
}

impl ElementTable {
    /// Returns the element with the given atomic number, if tabulated.
    pub fn get(&self, atomic_number: u32) -> Option<&Element> {
        self.elements.get(atomic_number as usize)?.as_ref()
    }

    /// True when the atomic number maps to a tabulated element.
    pub fn contains(&self, atomic_number: u32) -> bool {
        self.get(atomic_number).is_some()
    }

    /// Builds the standard table. Masses are in daltons (g/mol).
    pub fn standard() -> Self {
        let mut elements: Vec<Option<Element>> = vec![None; 111];
        let mut put = |e: Element| {
            let z = e.atomic_number as usize;
            elements[z] = Some(e);
        };

        put(Element::new(1, "H", "hydrogen", 1.007947).colored(GREEN));
        put(Element::new(2, "He", "helium", 4.003));
        put(Element::new(3, "Li", "lithium", 6.941));
        put(Element::new(4, "Be", "beryllium", 9.012));
        put(Element::new(5, "B", "boron", 10.811));
        put(Element::new(6, "C", "carbon", 12.01078).colored(GRAY));
        put(Element::new(7, "N", "nitrogen", 14.00672).colored(BLUE));
        put(Element::new(8, "O", "oxygen", 15.99943).colored(RED));
        put(Element::new(9, "F", "fluorine", 18.998));
        put(Element::new(10, "Ne", "neon", 20.180));
        put(Element::new(11, "Na", "sodium", 22.989769282));
        put(Element::new(12, "Mg", "magnesium", 24.30506));
        put(Element::new(13, "Al", "aluminum", 26.982));
        put(Element::new(14, "Si", "silicon", 28.086));
        put(Element::new(15, "P", "phosphorus", 30.9737622).colored(MAGENTA));
        put(Element::new(16, "S", "sulfur", 32.0655).colored(YELLOW));
        put(Element::new(17, "Cl", "chlorine", 35.4532));
        put(Element::new(18, "Ar", "argon", 39.948));
        put(Element::new(19, "K", "potassium", 39.09831));
        put(Element::new(20, "Ca", "calcium", 40.0784));
        put(Element::new(21, "Sc", "scandium", 44.956));
        put(Element::new(22, "Ti", "titanium", 47.88));
        put(Element::new(23, "V", "vanadium", 50.942));
        put(Element::new(24, "Cr", "chromium", 51.996));
        put(Element::new(25, "Mn", "manganese", 54.9380455));
        put(Element::new(26, "Fe", "iron", 55.8452));
        put(Element::new(27, "Co", "cobalt", 58.9331955));
        put(Element::new(28, "Ni", "nickel", 58.69342));
        put(Element::new(29, "Cu", "copper", 63.5463));
        put(Element::new(30, "Zn", "zinc", 65.4094));
        put(Element::new(31, "Ga", "gallium", 69.723));
        put(Element::new(32, "Ge", "germanium", 72.61));
        put(Element::new(33, "As", "arsenic", 74.922));
        put(Element::new(34, "Se", "selenium", 78.963));
        put(Element::new(35, "Br", "bromine", 79.9041));
        put(Element::new(36, "Kr", "krypton", 83.80));
        put(Element::new(37, "Rb", "rubidium", 85.468));
        put(Element::new(38, "Sr", "strontium", 87.62));
        put(Element::new(39, "Y", "yttrium", 88.906));
        put(Element::new(40, "Zr", "zirconium", 91.224));
        put(Element::new(41, "Nb", "niobium", 92.906));
        put(Element::new(42, "Mo", "molybdenum", 95.94));
        put(Element::new(43, "Tc", "technetium", 97.907));
        put(Element::new(44, "Ru", "ruthenium", 101.07));
        put(Element::new(45, "Rh", "rhodium", 102.906));
        put(Element::new(46, "Pd", "palladium", 106.42));
        put(Element::new(47, "Ag", "silver", 107.868));
        put(Element::new(48, "Cd", "cadmium", 112.411));
        put(Element::new(49, "In", "indium", 114.82));
        put(Element::new(50, "Sn", "tin", 118.710));
        put(Element::new(51, "Sb", "antimony", 121.757));
        put(Element::new(52, "Te", "tellurium", 127.60));
        put(Element::new(53, "I", "iodine", 126.904));
        put(Element::new(54, "Xe", "xenon", 131.290));
        put(Element::new(55, "Cs", "cesium", 132.905));
        put(Element::new(56, "Ba", "barium", 137.327));
        put(Element::new(57, "La", "lanthanum", 138.906));
        put(Element::new(58, "Ce", "cerium", 140.115));
        put(Element::new(59, "Pr", "praseodymium", 140.908));
        put(Element::new(60, "Nd", "neodymium", 144.24));
        put(Element::new(61, "Pm", "promethium", 144.913));
        put(Element::new(62, "Sm", "samarium", 150.36));
        put(Element::new(63, "Eu", "europium", 151.965));
        put(Element::new(64, "Gd", "gadolinium", 157.25));
        put(Element::new(65, "Tb", "terbium", 158.925));
        put(Element::new(66, "Dy", "dysprosium", 162.50));
        put(Element::new(67, "Ho", "holmium", 164.930));
        put(Element::new(68, "Er", "erbium", 167.26));
        put(Element::new(69, "Tm", "thulium", 168.934));
        put(Element::new(70, "Yb", "ytterbium", 173.04));
        put(Element::new(71, "Lu", "lutetium", 174.967));
        put(Element::new(72, "Hf", "hafnium", 178.49));
        put(Element::new(73, "Ta", "tantalum", 180.948));
        put(Element::new(74, "W", "tungsten", 183.84));
        put(Element::new(75, "Re", "rhenium", 186.207));
        put(Element::new(76, "Os", "osmium", 190.2));
        put(Element::new(77, "Ir", "iridium", 192.22));
        put(Element::new(78, "Pt", "platinum", 195.08));
        put(Element::new(79, "Au", "gold", 196.967).colored(YELLOW));
        put(Element::new(80, "Hg", "mercury", 200.59));
        put(Element::new(81, "Tl", "thallium", 204.383));
        put(Element::new(82, "Pb", "lead", 207.2));
        put(Element::new(83, "Bi", "bismuth", 208.980));
        put(Element::new(84, "Po", "polonium", 208.982));
        put(Element::new(85, "At", "astatine", 209.978));
        put(Element::new(86, "Rn", "radon", 222.018));
        put(Element::new(87, "Fr", "francium", 223.020));
        put(Element::new(88, "Ra", "radium", 226.025));
        put(Element::new(89, "Ac", "actinium", 227.028));
        put(Element::new(90, "Th", "thorium", 232.038));
        put(Element::new(91, "Pa", "protactinium", 231.038));
        put(Element::new(92, "U", "uranium", 238.028913));
        put(Element::new(93, "Np", "neptunium", 237.048));
        put(Element::new(94, "Pu", "plutonium", 244.064));
        put(Element::new(95, "Am", "americium", 243.061));
        put(Element::new(96, "Cm", "curium", 247.070));
        put(Element::new(97, "Bk", "berkelium", 247.070));
        put(Element::new(98, "Cf", "californium", 251.080));
        put(Element::new(99, "Es", "einsteinium", 252.083));
        put(Element::new(100, "Fm", "fermium", 257.095));
        put(Element::new(101, "Md", "mendelevium", 258.099));
        put(Element::new(102, "No", "nobelium", 259.101));
        put(Element::new(103, "Lr", "lawrencium", 260.105));
        put(Element::new(104, "Rf", "rutherfordium", 261.0));
        put(Element::new(105, "Db", "dubnium", 262.0));
        put(Element::new(106, "Sg", "seaborgium", 263.0));
        put(Element::new(107, "Bh", "bohrium", 262.0));
        put(Element::new(108, "Hs", "hassium", 265.0));
        put(Element::new(109, "Mt", "meitnerium", 266.0));
        put(Element::new(110, "Ds", "darmstadtium", 281.0));

        Self { elements }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_covers_first_110_elements() {
        let table = ElementTable::standard();
        for z in 1..=110 {
            assert!(table.contains(z), "missing element {}", z);
        }
        assert!(!table.contains(0));
        assert!(!table.contains(111));
    }

    #[test]
    fn common_elements_have_expected_symbols_and_masses() {
        let table = ElementTable::standard();
        let carbon = table.get(6).unwrap();
        assert_eq!(carbon.symbol, "C");
        assert!((carbon.mass - 12.01078).abs() < 1e-9);

        let oxygen = table.get(8).unwrap();
        assert_eq!(oxygen.name, "oxygen");
        assert_eq!(oxygen.default_color, RED);
    }

    #[test]
    fn independent_tables_share_no_state() {
        let a = ElementTable::standard();
        let mut b = ElementTable::standard();
        b.elements[1] = None;
        assert!(a.contains(1));
        assert!(!b.contains(1));
    }
}
